//! Per-process exclusion of concurrent work on one order

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;

use crate::BillingError;

/// Order ids currently being processed by this process
#[derive(Debug, Clone, Default)]
pub struct InFlightOrders {
    orders: Arc<DashSet<String>>,
}

/// Membership in the in-flight set; leaves it on drop
#[derive(Debug)]
pub struct InFlightGuard {
    orders: Arc<DashSet<String>>,
    order_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.orders.remove(&self.order_id);
    }
}

impl InFlightOrders {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter without waiting
    pub fn try_enter(&self, order_id: &str) -> Option<InFlightGuard> {
        self.orders.insert(order_id.to_string()).then(|| InFlightGuard {
            orders: Arc::clone(&self.orders),
            order_id: order_id.to_string(),
        })
    }

    /// Enter, polling while another request holds the order.
    ///
    /// # Errors
    /// Returns `InFlight` if the order is still held after `attempts` polls.
    pub async fn enter(
        &self,
        order_id: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<InFlightGuard, BillingError> {
        if let Some(guard) = self.try_enter(order_id) {
            return Ok(guard);
        }

        tracing::debug!(order_id, "Order in flight, waiting");
        for _ in 0..attempts {
            tokio::time::sleep(interval).await;
            if let Some(guard) = self.try_enter(order_id) {
                return Ok(guard);
            }
        }

        tracing::warn!(order_id, "Order still in flight after waiting");
        Err(BillingError::InFlight)
    }

    /// Whether an order is currently held
    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains(order_id)
    }

    /// Number of orders currently held
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether no order is held
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
