//! Billing worker: runs the invoice scheduler until Ctrl-C.
//!
//! This binary wires the in-memory stores and collaborators, so it starts
//! empty and nothing feeds it contracts or sales. It shows how configuration,
//! logging and the scheduler fit together; a deployment swaps in persistent
//! `BillingStores` and real `Collaborators` through `BillingService::new`.

use std::sync::Arc;

use anyhow::Context;
use talentbill_infra::{BillingConfig, BillingService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BillingConfig::from_env().context("loading billing configuration")?;
    talentbill_observability::init(config.log_format);

    tracing::info!(
        prefix = %config.invoice_prefix,
        poll_ms = config.poll_interval.as_millis() as u64,
        "starting billing worker"
    );
    tracing::warn!("using in-memory stores; state is lost on exit");

    let poll_interval = config.poll_interval;
    let billing = BillingService::in_memory(config);
    let scheduler = Arc::new(billing.service.scheduler()?);
    let handle = scheduler
        .spawn(poll_interval, "billing-scheduler")
        .context("spawning scheduler thread")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");

    let stats = handle.stats();
    tokio::task::spawn_blocking(move || handle.shutdown())
        .await
        .context("joining scheduler thread")?;

    tracing::info!(
        ticks = stats.ticks,
        activated = stats.invoices_activated,
        overdue = stats.invoices_marked_overdue,
        failures = stats.failures,
        "billing worker stopped"
    );
    Ok(())
}
