//! Question usage windows and counters
//!
//! Counters are stored together with the start of the window they cover.
//! A counter whose window start is older than the window containing `now`
//! is stale and reads as zero, whether or not anything has rewritten it yet.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Calendar window a question counter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageWindow {
    /// Local calendar day
    Daily,
    /// Local calendar week starting Monday
    Weekly,
    /// Local calendar month
    Monthly,
}

impl UsageWindow {
    /// All windows in limit precedence order
    pub const ALL: [Self; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// Get the window as an API string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Start of the window containing `now`, at local midnight
    pub fn start_at(&self, now: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
        let today = now.with_timezone(&tz).date_naive();
        let first_day = match self {
            Self::Daily => today,
            Self::Weekly => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Self::Monthly => today.with_day(1).unwrap_or(today),
        };
        local_midnight(first_day, tz)
    }

    /// When the window containing `now` ends: tomorrow, next Monday or the
    /// first of next month, at local midnight
    pub fn next_reset(&self, now: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
        let start = self.start_at(now, tz).with_timezone(&tz).date_naive();
        let next = match self {
            Self::Daily => start.succ_opt(),
            Self::Weekly => start.checked_add_signed(Duration::days(7)),
            Self::Monthly => start.checked_add_months(Months::new(1)),
        };
        local_midnight(next.unwrap_or(NaiveDate::MAX), tz)
    }
}

impl std::fmt::Display for UsageWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn local_midnight(date: NaiveDate, tz: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - Duration::seconds(i64::from(tz.local_minus_utc()))).and_utc()
}

/// Seoul is UTC+9 all year; window boundaries default to it
pub const SEOUL_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// A counter and the window start it was last written for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCount {
    /// Questions counted in the stored window
    pub used: u32,
    /// Start of the window `used` belongs to
    pub window_start: Option<DateTime<Utc>>,
}

impl WindowCount {
    /// Create a counter for a given window start
    pub const fn new(used: u32, window_start: DateTime<Utc>) -> Self {
        Self {
            used,
            window_start: Some(window_start),
        }
    }

    /// Whether the stored value belongs to a window that has already ended
    pub fn is_stale(&self, window: UsageWindow, now: DateTime<Utc>, tz: FixedOffset) -> bool {
        match self.window_start {
            Some(start) => start < window.start_at(now, tz),
            None => true,
        }
    }

    /// Usage within the window containing `now`
    pub fn effective(&self, window: UsageWindow, now: DateTime<Utc>, tz: FixedOffset) -> u32 {
        if self.is_stale(window, now, tz) {
            0
        } else {
            self.used
        }
    }

    /// Counter after one more question at `now`
    pub fn incremented(&self, window: UsageWindow, now: DateTime<Utc>, tz: FixedOffset) -> Self {
        Self::new(
            self.effective(window, now, tz).saturating_add(1),
            window.start_at(now, tz),
        )
    }
}

/// Per-user question counters for the three windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    /// Questions today
    pub daily: WindowCount,
    /// Questions this week
    pub weekly: WindowCount,
    /// Questions this month
    pub monthly: WindowCount,
    /// Last time a question was counted
    pub last_question_at: Option<DateTime<Utc>>,
}

impl UsageCounters {
    /// Stored counter for a window
    pub fn window(&self, window: UsageWindow) -> &WindowCount {
        match window {
            UsageWindow::Daily => &self.daily,
            UsageWindow::Weekly => &self.weekly,
            UsageWindow::Monthly => &self.monthly,
        }
    }

    /// Usage within the window containing `now`
    pub fn used(&self, window: UsageWindow, now: DateTime<Utc>, tz: FixedOffset) -> u32 {
        self.window(window).effective(window, now, tz)
    }

    /// Counters after one question at `now`; a single question counts
    /// against all three windows
    pub fn incremented(&self, now: DateTime<Utc>, tz: FixedOffset) -> Self {
        Self {
            daily: self.daily.incremented(UsageWindow::Daily, now, tz),
            weekly: self.weekly.incremented(UsageWindow::Weekly, now, tz),
            monthly: self.monthly.incremented(UsageWindow::Monthly, now, tz),
            last_question_at: Some(now),
        }
    }
}

/// Current window starts for an increment issued at `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStarts {
    /// Start of today
    pub daily: DateTime<Utc>,
    /// Start of this week
    pub weekly: DateTime<Utc>,
    /// Start of this month
    pub monthly: DateTime<Utc>,
}

impl WindowStarts {
    /// Window starts containing `now`
    pub fn at(now: DateTime<Utc>, tz: FixedOffset) -> Self {
        Self {
            daily: UsageWindow::Daily.start_at(now, tz),
            weekly: UsageWindow::Weekly.start_at(now, tz),
            monthly: UsageWindow::Monthly.start_at(now, tz),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    /// 2026-10-14 (Wednesday) 15:30 KST
    fn wednesday_afternoon() -> DateTime<Utc> {
        kst()
            .with_ymd_and_hms(2026, 10, 14, 15, 30, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn kst_midnight(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        kst().with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_window_starts_use_local_midnight() {
        let now = wednesday_afternoon();
        assert_eq!(UsageWindow::Daily.start_at(now, kst()), kst_midnight(2026, 10, 14));
        assert_eq!(UsageWindow::Weekly.start_at(now, kst()), kst_midnight(2026, 10, 12));
        assert_eq!(UsageWindow::Monthly.start_at(now, kst()), kst_midnight(2026, 10, 1));
    }

    #[test]
    fn test_next_reset_boundaries() {
        let now = wednesday_afternoon();
        assert_eq!(UsageWindow::Daily.next_reset(now, kst()), kst_midnight(2026, 10, 15));
        assert_eq!(UsageWindow::Weekly.next_reset(now, kst()), kst_midnight(2026, 10, 19));
        assert_eq!(UsageWindow::Monthly.next_reset(now, kst()), kst_midnight(2026, 11, 1));
    }

    #[test]
    fn test_next_reset_across_year_end() {
        let now = kst()
            .with_ymd_and_hms(2026, 12, 31, 23, 59, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(UsageWindow::Daily.next_reset(now, kst()), kst_midnight(2027, 1, 1));
        assert_eq!(UsageWindow::Monthly.next_reset(now, kst()), kst_midnight(2027, 1, 1));
    }

    #[test]
    fn test_local_day_differs_from_utc_day() {
        // 2026-10-14 23:30 UTC is already 2026-10-15 08:30 in Seoul
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 23, 30, 0).unwrap();
        assert_eq!(UsageWindow::Daily.start_at(now, kst()), kst_midnight(2026, 10, 15));
    }

    #[test]
    fn test_stale_counter_reads_as_zero() {
        let now = wednesday_afternoon();
        let yesterday = kst_midnight(2026, 10, 13);
        let count = WindowCount::new(3, yesterday);

        assert!(count.is_stale(UsageWindow::Daily, now, kst()));
        assert_eq!(count.effective(UsageWindow::Daily, now, kst()), 0);
        // Same value is still current for the week
        assert_eq!(count.effective(UsageWindow::Weekly, now, kst()), 3);
    }

    #[test]
    fn test_increment_resets_stale_windows() {
        let now = wednesday_afternoon();
        let counters = UsageCounters {
            daily: WindowCount::new(3, kst_midnight(2026, 10, 13)),
            weekly: WindowCount::new(5, kst_midnight(2026, 10, 12)),
            monthly: WindowCount::new(12, kst_midnight(2026, 9, 1)),
            last_question_at: None,
        };

        let next = counters.incremented(now, kst());
        assert_eq!(next.daily, WindowCount::new(1, kst_midnight(2026, 10, 14)));
        assert_eq!(next.weekly, WindowCount::new(6, kst_midnight(2026, 10, 12)));
        assert_eq!(next.monthly, WindowCount::new(1, kst_midnight(2026, 10, 1)));
        assert_eq!(next.last_question_at, Some(now));
    }

    #[test]
    fn test_missing_window_start_is_stale() {
        let count = WindowCount {
            used: 7,
            window_start: None,
        };
        assert_eq!(
            count.effective(UsageWindow::Monthly, wednesday_afternoon(), kst()),
            0
        );
    }
}
