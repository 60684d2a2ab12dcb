//! Billing configuration

use std::time::Duration;

/// Default Toss Payments API base URL
pub const TOSS_API_BASE: &str = "https://api.tosspayments.com";

/// Billing service configuration
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Toss Payments secret key
    pub toss_secret_key: String,
    /// Toss Payments API base URL
    pub toss_api_base: String,
    /// Gateway request timeout
    pub gateway_timeout: Duration,
    /// Polls while another request confirms the same order
    pub wait_attempts: u32,
    /// Delay between polls
    pub wait_interval: Duration,
    /// Age after which a `confirming` claim may be taken over
    pub claim_stale_after: Duration,
    /// Overdue subscriptions handled per sweep pass
    pub sweep_batch: i64,
    /// How long the active plan catalog is cached
    pub plan_cache_ttl: Duration,
}

impl BillingConfig {
    /// Create a new billing config
    pub fn new(toss_secret_key: impl Into<String>) -> Self {
        Self {
            toss_secret_key: toss_secret_key.into(),
            toss_api_base: TOSS_API_BASE.to_string(),
            gateway_timeout: Duration::from_secs(30),
            wait_attempts: 50,
            wait_interval: Duration::from_millis(100),
            claim_stale_after: Duration::from_secs(120),
            sweep_batch: 500,
            plan_cache_ttl: Duration::from_secs(300),
        }
    }

    /// Set the gateway base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.toss_api_base = base.into();
        self
    }

    /// Set the gateway request timeout
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Set the in-flight wait policy
    pub fn with_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.wait_attempts = attempts;
        self.wait_interval = interval;
        self
    }

    /// Set the stale claim age
    pub fn with_claim_stale_after(mut self, age: Duration) -> Self {
        self.claim_stale_after = age;
        self
    }

    /// Set the sweep batch size
    pub fn with_sweep_batch(mut self, batch: i64) -> Self {
        self.sweep_batch = batch;
        self
    }

    /// Set the plan catalog cache TTL
    pub fn with_plan_cache_ttl(mut self, ttl: Duration) -> Self {
        self.plan_cache_ttl = ttl;
        self
    }
}
