//! Application state for the Talk API service.

use std::sync::Arc;
use std::time::Duration;

use anshim_billing_core::BillingService;
use anshim_db::DbPool;
use anshim_quota_core::QuotaService;

use crate::answer::AnswerProvider;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Question entitlement and counting
    pub quota: QuotaService,
    /// Plans, payments and subscriptions
    pub billing: Arc<BillingService>,
    /// AI answer service
    pub answers: Arc<dyn AnswerProvider>,
    /// Database pool for the readiness probe
    pub pool: Option<DbPool>,
    request_timeout: Duration,
}

impl AppState {
    /// Create new application state
    pub fn new(
        quota: QuotaService,
        billing: BillingService,
        answers: Arc<dyn AnswerProvider>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            quota,
            billing: Arc::new(billing),
            answers,
            pool: None,
            request_timeout,
        }
    }

    /// Attach the database pool checked by `/ready`
    pub fn with_pool(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("billing", &self.billing)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
