use std::sync::Arc;

use anyhow::Context;

use billseq_api::app::{self, AppServices, services};
use billseq_infra::InvoiceConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    billseq_observability::init();

    let config = InvoiceConfig::from_env().context("invalid invoice configuration")?;
    tracing::info!(
        mode = ?config.mode,
        failure_rate = config.failure_rate,
        simulate_failures = config.simulate_failures,
        base_backoff_ms = config.base_backoff_delay.as_millis() as u64,
        max_backoff_ms = config.max_backoff_delay.as_millis() as u64,
        retry_interval_secs = config.retry_interval.as_secs(),
        "invoice configuration loaded"
    );

    let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
    let store = services::connect_store(database_url.as_deref())
        .await
        .context("failed to initialise invoice store")?;

    let services = Arc::new(AppServices::new(config, store));
    let background = services.start_background();
    let app = app::build_app(Arc::clone(&services));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    background.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
