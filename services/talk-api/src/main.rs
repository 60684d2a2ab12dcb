//! Anshim Talk API server

use std::net::SocketAddr;
use std::sync::Arc;

use anshim_billing_core::{BillingService, PaymentGateway, TossPayments};
use anshim_db::Repositories;
use anshim_quota_core::QuotaService;
use axum::Router;
use talk_api::answer::{AnswerProvider, HttpAnswerProvider};
use talk_api::{build_router, setup_metrics, AppState, Config};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("talk_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Anshim Talk API");

    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    let pool = anshim_db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    let repos = Repositories::new(pool.clone()).shared();

    let gateway: Arc<dyn PaymentGateway> = Arc::new(TossPayments::new(&config.billing)?);
    let billing = BillingService::new(&repos, gateway, config.billing.clone());
    let quota = QuotaService::new(&repos, config.quota.clone())?;
    let answers: Arc<dyn AnswerProvider> = Arc::new(HttpAnswerProvider::new(
        config.answer_service_url.clone(),
        config.answer_timeout,
    )?);

    let sweep = billing.spawn_sweep(config.expiry_sweep_interval);
    if sweep.is_none() {
        tracing::info!("Expiry sweep disabled");
    }

    let state = AppState::new(quota, billing, answers, config.request_timeout).with_pool(pool);
    let app = build_router(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    run_http_server(app, addr).await?;

    if let Some(handle) = sweep {
        handle.abort();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
