//! Entitlement resolution
//!
//! [`resolve`] is a pure function of the caller's state and the clock. It
//! never fails: when state could not be established it denies.

use anshim_types::{LimitKind, QuestionDecision, Remaining, UsageCounters, UsageWindow};
use chrono::{DateTime, FixedOffset, Utc};

use crate::config::QuotaLimits;

/// What is known about the caller when a question is about to be asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementSnapshot {
    /// Lookup failed, profile missing or guest pass tampered
    Indeterminate,
    /// Anonymous session with its question count
    Guest { used: u32 },
    /// Authenticated user
    Member {
        counters: UsageCounters,
        /// An active subscription with an end date after `now` exists
        subscribed: bool,
    },
}

/// Decide whether one more question may be asked.
///
/// Member windows are checked daily, weekly, monthly; the first exhausted
/// window binds even if a later one is also exhausted.
pub fn resolve(
    snapshot: &EntitlementSnapshot,
    limits: &QuotaLimits,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> QuestionDecision {
    match snapshot {
        EntitlementSnapshot::Indeterminate => QuestionDecision::indeterminate(),
        EntitlementSnapshot::Member {
            subscribed: true, ..
        } => QuestionDecision::unlimited(),
        EntitlementSnapshot::Guest { used } => {
            let remaining = limits.guest.saturating_sub(*used);
            QuestionDecision {
                allowed: *used < limits.guest,
                limit_kind: Some(LimitKind::Guest),
                remaining: Remaining::Limited(remaining),
                reset_at: None,
            }
        }
        EntitlementSnapshot::Member {
            counters,
            subscribed: false,
        } => resolve_windows(counters, limits, now, tz),
    }
}

fn window_limit(limits: &QuotaLimits, window: UsageWindow) -> u32 {
    match window {
        UsageWindow::Daily => limits.daily,
        UsageWindow::Weekly => limits.weekly,
        UsageWindow::Monthly => limits.monthly,
    }
}

fn resolve_windows(
    counters: &UsageCounters,
    limits: &QuotaLimits,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> QuestionDecision {
    let mut least = u32::MAX;
    for window in UsageWindow::ALL {
        let remaining = window_limit(limits, window).saturating_sub(counters.used(window, now, tz));
        if remaining == 0 {
            return QuestionDecision {
                allowed: false,
                limit_kind: Some(window.into()),
                remaining: Remaining::Limited(0),
                reset_at: Some(window.next_reset(now, tz)),
            };
        }
        least = least.min(remaining);
    }

    QuestionDecision {
        allowed: true,
        limit_kind: None,
        remaining: Remaining::Limited(least),
        reset_at: None,
    }
}
