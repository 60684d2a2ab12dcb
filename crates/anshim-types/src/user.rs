//! User types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique user identifier (issued by the identity provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Who is asking.
///
/// The identity provider either supplies a stable user id or nothing at all;
/// a caller without an id is a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Anonymous browser session, optionally carrying a previously issued guest pass
    Guest {
        /// Signed guest pass from client storage
        pass: Option<String>,
    },
    /// Authenticated user
    Member(UserId),
}

impl Identity {
    /// Get the user ID if this is an authenticated member
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Member(id) => Some(*id),
            Self::Guest { .. } => None,
        }
    }

    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Guest { .. } => "guest",
            Self::Member(_) => "member",
        }
    }
}
