//! Configuration for the Talk API service.

use std::time::Duration;

use anshim_billing_core::BillingConfig;
use anshim_quota_core::QuotaConfig;
use chrono::FixedOffset;

/// Talk API configuration
#[derive(Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Timeout for every API route except asking, which `answer_timeout` bounds
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
    /// AI answer service endpoint
    pub answer_service_url: String,
    /// Timeout for one answer
    pub answer_timeout: Duration,
    /// Interval of the subscription expiry sweep; zero disables it
    pub expiry_sweep_interval: Duration,
    /// Question quota configuration
    pub quota: QuotaConfig,
    /// Billing core configuration
    pub billing: BillingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let parsed = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            lookup(key)
                .unwrap_or_else(|| default.to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid(key))
        };

        let database_url = required("DATABASE_URL")?;
        let toss_secret_key = required("TOSS_SECRET_KEY")?;
        let answer_service_url = required("ANSWER_SERVICE_URL")?;
        let guest_pass_secret = required("GUEST_PASS_SECRET")?;
        if guest_pass_secret.len() < 32 {
            return Err(ConfigError::Invalid("GUEST_PASS_SECRET"));
        }

        let http_port = u16::try_from(parsed("HTTP_PORT", "8080")?)
            .map_err(|_| ConfigError::Invalid("HTTP_PORT"))?;

        let metrics_enabled = lookup("METRICS_ENABLED")
            .unwrap_or_else(|| "true".to_string())
            .parse()
            .unwrap_or(true);

        let limit = |key: &'static str, default: &str| -> Result<u32, ConfigError> {
            u32::try_from(parsed(key, default)?).map_err(|_| ConfigError::Invalid(key))
        };
        let offset_hours: i32 = lookup("LOCAL_UTC_OFFSET_HOURS")
            .unwrap_or_else(|| "9".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LOCAL_UTC_OFFSET_HOURS"))?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or(ConfigError::Invalid("LOCAL_UTC_OFFSET_HOURS"))?;

        let quota = QuotaConfig::new(guest_pass_secret)
            .with_limits(
                limit("QUOTA_DAILY_LIMIT", "3")?,
                limit("QUOTA_WEEKLY_LIMIT", "10")?,
                limit("QUOTA_MONTHLY_LIMIT", "30")?,
            )
            .with_utc_offset(utc_offset);

        let mut billing = BillingConfig::new(toss_secret_key)
            .with_wait(
                limit("CONFIRM_WAIT_ATTEMPTS", "50")?,
                Duration::from_millis(parsed("CONFIRM_WAIT_INTERVAL_MS", "100")?),
            )
            .with_claim_stale_after(Duration::from_secs(parsed("CONFIRM_CLAIM_STALE_SECS", "120")?));
        if let Some(base) = lookup("TOSS_API_BASE") {
            billing = billing.with_api_base(base);
        }

        Ok(Self {
            http_port,
            database_url,
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", "30")?),
            metrics_enabled,
            answer_service_url,
            answer_timeout: Duration::from_secs(parsed("ANSWER_TIMEOUT_SECS", "60")?),
            expiry_sweep_interval: Duration::from_secs(parsed("EXPIRY_SWEEP_INTERVAL_SECS", "300")?),
            quota,
            billing,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("request_timeout", &self.request_timeout)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("answer_service_url", &self.answer_service_url)
            .field("expiry_sweep_interval", &self.expiry_sweep_interval)
            .finish_non_exhaustive()
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
