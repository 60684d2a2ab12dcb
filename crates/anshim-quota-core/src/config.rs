//! Quota configuration

use anshim_types::SEOUL_UTC_OFFSET_SECS;
use chrono::{FixedOffset, Offset, Utc};

/// Default questions per local day for members without a subscription
pub const DAILY_QUESTION_LIMIT: u32 = 3;
/// Default questions per local week (Monday start)
pub const WEEKLY_QUESTION_LIMIT: u32 = 10;
/// Default questions per local month
pub const MONTHLY_QUESTION_LIMIT: u32 = 30;
/// Questions a guest may ask per browser session
pub const GUEST_SESSION_LIMIT: u32 = 1;

/// Question limits applied by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
    pub guest: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily: DAILY_QUESTION_LIMIT,
            weekly: WEEKLY_QUESTION_LIMIT,
            monthly: MONTHLY_QUESTION_LIMIT,
            guest: GUEST_SESSION_LIMIT,
        }
    }
}

/// Quota service configuration
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Per-window limits
    pub limits: QuotaLimits,
    /// Offset used to place window boundaries at local midnight
    pub utc_offset: FixedOffset,
    /// HMAC secret for guest passes (at least 32 bytes)
    pub guest_pass_secret: String,
}

impl QuotaConfig {
    /// Create a config with the default limits and Seoul time
    pub fn new(guest_pass_secret: impl Into<String>) -> Self {
        Self {
            limits: QuotaLimits::default(),
            utc_offset: FixedOffset::east_opt(SEOUL_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix()),
            guest_pass_secret: guest_pass_secret.into(),
        }
    }

    /// Set member window limits
    pub fn with_limits(mut self, daily: u32, weekly: u32, monthly: u32) -> Self {
        self.limits.daily = daily;
        self.limits.weekly = weekly;
        self.limits.monthly = monthly;
        self
    }

    /// Set the guest session limit
    pub fn with_guest_limit(mut self, guest: u32) -> Self {
        self.limits.guest = guest;
        self
    }

    /// Set the local time offset
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}
