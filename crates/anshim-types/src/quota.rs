//! Question quota decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UsageWindow;

/// Which limit a decision was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    /// Per-browser-session guest limit
    Guest,
    /// Daily member limit
    Daily,
    /// Weekly member limit
    Weekly,
    /// Monthly member limit
    Monthly,
}

impl LimitKind {
    /// Get the limit kind as an API string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl From<UsageWindow> for LimitKind {
    fn from(window: UsageWindow) -> Self {
        match window {
            UsageWindow::Daily => Self::Daily,
            UsageWindow::Weekly => Self::Weekly,
            UsageWindow::Monthly => Self::Monthly,
        }
    }
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Questions left before a limit binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "count")]
pub enum Remaining {
    /// Active subscription, no limit applies
    Unlimited,
    /// This many more questions are allowed
    Limited(u32),
}

impl Remaining {
    /// The count, or `None` when unlimited
    pub const fn count(&self) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limited(n) => Some(*n),
        }
    }
}

/// Outcome of an entitlement check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDecision {
    /// Whether a new question may be asked
    pub allowed: bool,
    /// Limit that bound the decision (always `guest` for guests)
    pub limit_kind: Option<LimitKind>,
    /// Questions left
    pub remaining: Remaining,
    /// When the binding limit resets
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuestionDecision {
    /// Indeterminate state: deny without naming a limit
    pub const fn indeterminate() -> Self {
        Self {
            allowed: false,
            limit_kind: None,
            remaining: Remaining::Limited(0),
            reset_at: None,
        }
    }

    /// Subscriber: always allowed, nothing counted against a limit
    pub const fn unlimited() -> Self {
        Self {
            allowed: true,
            limit_kind: None,
            remaining: Remaining::Unlimited,
            reset_at: None,
        }
    }
}
