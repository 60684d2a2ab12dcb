//! Anshim Talk API
//!
//! ## REST Endpoints
//!
//! - `POST /api/v1/users/onboard` - Create the caller's profile
//! - `GET /api/v1/questions/quota` - Whether the caller may ask
//! - `POST /api/v1/questions` - Ask a question
//! - `GET /api/v1/plans` - Plan catalog
//! - `POST /api/v1/payment/checkout` - Open an order
//! - `POST /api/v1/payment/confirm` - Confirm a checkout payment
//! - `POST /api/v1/payment/billing-key` - Register a card
//! - `POST /api/v1/payment/billing/charge` - Charge the registered card
//! - `GET /api/v1/subscription/status` - Membership status
//! - `POST /api/v1/subscription/auto-renew` - Toggle auto-renew
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

pub mod answer;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use crate::config::Config;
pub use crate::state::AppState;

/// Build the HTTP router
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    let timed = Router::new()
        .route("/users/onboard", post(handlers::onboard))
        .route("/questions/quota", get(handlers::get_quota))
        .route("/plans", get(handlers::list_plans))
        .route("/payment/checkout", post(handlers::checkout))
        .route("/payment/confirm", post(handlers::confirm))
        .route("/payment/billing-key", post(handlers::issue_billing_key))
        .route("/payment/billing/charge", post(handlers::charge_billing_key))
        .route("/subscription/status", get(handlers::get_status))
        .route("/subscription/auto-renew", post(handlers::set_auto_renew))
        .layer(TimeoutLayer::new(request_timeout));

    // Bounded by the answer client's own timeout, which answers 504
    let api_v1 = timed.route("/questions", post(handlers::ask));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready));

    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Outermost first
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}

/// Install the Prometheus recorder and describe the service metrics
pub fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Most handlers finish well under 200ms; payment confirmation waits on
    // the gateway and the answer service can take tens of seconds.
    let latency_buckets = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("talk_operation_duration_seconds".to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    metrics::describe_counter!(
        "questions_answered_total",
        "Answered questions counted against a quota, by identity kind"
    );
    metrics::describe_counter!(
        "questions_blocked_total",
        "Questions refused by the entitlement check, by binding limit"
    );
    metrics::describe_counter!(
        "payment_confirmations_total",
        "Payment confirmation and billing-key charge outcomes by result"
    );
    metrics::describe_counter!(
        "subscriptions_granted_total",
        "Subscriptions granted after a confirmed payment"
    );
    metrics::describe_counter!(
        "subscriptions_expired_total",
        "Subscriptions expired lazily or by the sweep"
    );
    metrics::describe_histogram!(
        "talk_operation_duration_seconds",
        "Operation latency in seconds by operation and result"
    );

    Ok(handle)
}
