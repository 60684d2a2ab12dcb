//! Membership tier types

use serde::{Deserialize, Serialize};

/// Membership tier stored on the user profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    /// Free tier with windowed question limits
    #[default]
    Basic,
    /// Paid tier, unlimited questions while a subscription is active
    Premium,
}

impl MembershipTier {
    /// Get the tier as a database/API string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }

    /// Whether this tier is a paid tier
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl std::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MembershipTier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" | "free" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}

/// Error parsing a tier string
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid tier: {0}")]
pub struct TierParseError(pub String);
