//! Payment types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainParseError;

/// Merchant order identifier shared with the payment gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// Create an order ID from an existing value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh order ID (`order_<32 hex>`)
    pub fn generate() -> Self {
        Self(format!("order_{}", Uuid::new_v4().simple()))
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment status
///
/// Moves forward only: `pending -> confirming -> {confirmed | failed}`.
/// `confirming -> pending` releases a claim after a temporary gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Checkout created, not yet confirmed
    Pending,
    /// Claimed by a confirmation in progress
    Confirming,
    /// Gateway confirmed the charge
    Confirmed,
    /// Gateway rejected the charge
    Failed,
}

impl PaymentStatus {
    /// Get the status as a database/API string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    /// Whether the record is final
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirming)
                | (Self::Confirming, Self::Pending)
                | (Self::Confirming, Self::Confirmed)
                | (Self::Confirming, Self::Failed)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirming" => Ok(Self::Confirming),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainParseError::new("payment status", other)),
        }
    }
}
