//! PostgreSQL repository implementations

mod payment;
mod plan;
mod subscription;
mod transaction;
mod user;

use std::sync::Arc;

pub use payment::PgPaymentRepository;
pub use plan::PgPlanRepository;
pub use subscription::PgSubscriptionRepository;
pub use transaction::{PgBillingStore, PgBillingTransaction};
pub use user::PgUserRepository;

use crate::repo::SharedRepositories;
use crate::DbPool;

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub users: PgUserRepository,
    pub subscriptions: PgSubscriptionRepository,
    pub payments: PgPaymentRepository,
    pub plans: PgPlanRepository,
    pub store: PgBillingStore,
}

impl Repositories {
    /// Create all repositories from a database pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            subscriptions: PgSubscriptionRepository::new(pool.clone()),
            payments: PgPaymentRepository::new(pool.clone()),
            plans: PgPlanRepository::new(pool.clone()),
            store: PgBillingStore::new(pool),
        }
    }

    /// Type-erase the repositories for the service layer
    pub fn shared(self) -> SharedRepositories {
        SharedRepositories {
            users: Arc::new(self.users),
            subscriptions: Arc::new(self.subscriptions),
            payments: Arc::new(self.payments),
            plans: Arc::new(self.plans),
            store: Arc::new(self.store),
        }
    }
}
