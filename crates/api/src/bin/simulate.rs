//! Chaos run: numbers a batch of synthetic orders under injected failures
//! and reports whether the result is gapless.
//!
//! `SIMULATION_ORDERS` (default 10) sets the batch size and
//! `SIMULATION_KEEP=true` skips cleanup. Uses `DATABASE_URL` like the API.

use std::sync::Arc;

use anyhow::{Context, bail};

use billseq_api::app::services;
use billseq_infra::InvoiceConfig;
use billseq_infra::InvoiceService;
use billseq_infra::simulation::{SimulationConfig, run_simulation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    billseq_observability::init();

    let config = InvoiceConfig::from_env().context("invalid invoice configuration")?;
    let mut sim = SimulationConfig::from_invoice_config(&config);

    if let Ok(raw) = std::env::var("SIMULATION_ORDERS") {
        sim.orders = raw
            .trim()
            .parse()
            .with_context(|| format!("SIMULATION_ORDERS: expected a count, got {raw:?}"))?;
    }
    if let Ok(raw) = std::env::var("SIMULATION_KEEP") {
        sim.cleanup = !matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }

    let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
    let store = services::connect_store(database_url.as_deref())
        .await
        .context("failed to initialise invoice store")?;

    let summary = run_simulation(Arc::new(InvoiceService::new(store)), sim).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("failed to render summary")?
    );
    println!(
        "successful={} failed={} total_attempts={} average_attempts={:.2} contiguous={} gapless={}",
        summary.successful(),
        summary.failed(),
        summary.total_attempts(),
        summary.average_attempts(),
        summary.is_contiguous(),
        summary.is_gapless(),
    );

    // A store with earlier invoices starts above 1, so only holes are fatal.
    if !summary.is_contiguous() {
        bail!("assigned invoice numbers have gaps or repeats");
    }
    Ok(())
}
