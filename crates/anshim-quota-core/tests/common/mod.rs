//! Common test utilities for anshim-quota-core integration tests

use anshim_db::memory::MemoryStore;
use anshim_db::{SubscriptionRow, UserRow};
use anshim_quota_core::{QuotaConfig, QuotaService};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use uuid::Uuid;

pub const GUEST_SECRET: &str = "guest-pass-secret-for-integration-tests-42";

pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// Wednesday 2026-10-14 15:00 KST
pub fn wednesday_afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 6, 0, 0).unwrap()
}

pub fn service(store: &MemoryStore) -> QuotaService {
    QuotaService::new(&store.shared(), QuotaConfig::new(GUEST_SECRET)).unwrap()
}

/// Basic-tier profile with no questions asked
pub fn basic_user() -> UserRow {
    let now = Utc::now();
    UserRow {
        id: Uuid::new_v4(),
        tier: "basic".to_string(),
        daily_questions_used: 0,
        daily_window_start: None,
        weekly_questions_used: 0,
        weekly_window_start: None,
        monthly_questions_used: 0,
        monthly_window_start: None,
        last_question_at: None,
        customer_key: None,
        billing_key: None,
        created_at: now,
        updated_at: now,
    }
}

#[allow(dead_code)]
pub fn active_subscription(user_id: Uuid, end_date: DateTime<Utc>) -> SubscriptionRow {
    SubscriptionRow {
        id: Uuid::new_v4(),
        user_id,
        plan_id: "premium_monthly".to_string(),
        status: "active".to_string(),
        start_date: end_date - Duration::days(30),
        end_date,
        auto_renew: false,
        payment_id: None,
        metadata: serde_json::json!({}),
        created_at: end_date - Duration::days(30),
        updated_at: end_date - Duration::days(30),
    }
}
