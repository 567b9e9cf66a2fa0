//! Time-triggered invoice promotion.
//!
//! `tick(now)` decides from `now` and the last run times which batch jobs are
//! due and runs them; nothing in it reads the clock. `spawn` drives `tick` from
//! a background thread with the system clock until shut down.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use talentbill_core::{DomainError, DomainResult};

use crate::lifecycle::{BatchReport, InvoiceLifecycle};

/// Which jobs ran in a tick, with their outcomes.
///
/// A job that failed as a whole leaves its report empty and its error set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub activation: Option<BatchReport>,
    pub overdue: Option<BatchReport>,
    pub activation_error: Option<String>,
    pub overdue_error: Option<String>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.activation.is_none()
            && self.overdue.is_none()
            && self.activation_error.is_none()
            && self.overdue_error.is_none()
    }
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub activation_runs: u64,
    pub overdue_runs: u64,
    pub invoices_activated: u64,
    pub invoices_marked_overdue: u64,
    pub failures: u64,
    pub uptime_secs: u64,
}

impl SchedulerStats {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if let Some(run) = &report.activation {
            self.activation_runs += 1;
            self.invoices_activated += run.transitioned as u64;
            self.failures += run.failures.len() as u64;
        }
        if let Some(run) = &report.overdue {
            self.overdue_runs += 1;
            self.invoices_marked_overdue += run.transitioned as u64;
            self.failures += run.failures.len() as u64;
        }
        self.failures += u64::from(report.activation_error.is_some());
        self.failures += u64::from(report.overdue_error.is_some());
    }
}

#[derive(Debug, Default)]
struct LastRuns {
    activation: Option<DateTime<Utc>>,
    overdue: Option<DateTime<Utc>>,
}

pub struct ActivationScheduler {
    lifecycle: Arc<InvoiceLifecycle>,
    activation_interval: chrono::Duration,
    overdue_interval: chrono::Duration,
    last_runs: Mutex<LastRuns>,
}

impl ActivationScheduler {
    pub fn new(
        lifecycle: Arc<InvoiceLifecycle>,
        activation_interval: Duration,
        overdue_interval: Duration,
    ) -> DomainResult<Self> {
        let convert = |d: Duration, what: &str| {
            chrono::Duration::from_std(d)
                .map_err(|_| DomainError::validation(format!("{what} interval out of range")))
        };
        Ok(Self {
            lifecycle,
            activation_interval: convert(activation_interval, "activation")?,
            overdue_interval: convert(overdue_interval, "overdue")?,
            last_runs: Mutex::new(LastRuns::default()),
        })
    }

    /// Run whichever jobs are due at `now`.
    ///
    /// Jobs run independently. One that fails as a whole is reported, keeps
    /// its previous last-run time so the next tick retries it, and does not
    /// stop the other job.
    pub fn tick(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let mut last = self
            .last_runs
            .lock()
            .map_err(|_| DomainError::invariant("scheduler lock poisoned"))?;
        let mut report = TickReport::default();

        if is_due(last.activation, self.activation_interval, now) {
            match self.lifecycle.activate_due(now) {
                Ok(run) => {
                    report.activation = Some(run);
                    last.activation = Some(now);
                }
                Err(err) => {
                    error!(job = "activation", error = %err, "scheduled job failed");
                    report.activation_error = Some(err.to_string());
                }
            }
        }
        if is_due(last.overdue, self.overdue_interval, now) {
            match self.lifecycle.mark_overdue_if_past_due(now) {
                Ok(run) => {
                    report.overdue = Some(run);
                    last.overdue = Some(now);
                }
                Err(err) => {
                    error!(job = "overdue", error = %err, "scheduled job failed");
                    report.overdue_error = Some(err.to_string());
                }
            }
        }

        Ok(report)
    }

    /// Spawn the scheduler in a background thread.
    pub fn spawn(
        self: Arc<Self>,
        poll_interval: Duration,
        name: impl Into<String>,
    ) -> std::io::Result<SchedulerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let stats_clone = stats.clone();
        let name = name.into();

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            scheduler_loop(&self, &name, poll_interval, shutdown_rx, stats_clone);
        })?;

        Ok(SchedulerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

/// A job is due when it never ran or its interval has fully elapsed. A clock
/// that moved backwards never makes a job due.
pub fn is_due(last: Option<DateTime<Utc>>, interval: chrono::Duration, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(last) => now >= last && now - last >= interval,
    }
}

fn scheduler_loop(
    scheduler: &ActivationScheduler,
    name: &str,
    poll_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    info!(scheduler = %name, "scheduler started");
    let started = Instant::now();

    loop {
        match scheduler.tick(Utc::now()) {
            Ok(report) => {
                if !report.is_idle() {
                    debug!(scheduler = %name, ?report, "scheduler tick");
                }
                if let Ok(mut s) = stats.lock() {
                    s.record(&report);
                    s.uptime_secs = started.elapsed().as_secs();
                }
            }
            Err(err) => {
                error!(scheduler = %name, error = %err, "scheduler tick failed");
                if let Ok(mut s) = stats.lock() {
                    s.ticks += 1;
                    s.failures += 1;
                    s.uptime_secs = started.elapsed().as_secs();
                }
            }
        }

        match shutdown_rx.recv_timeout(poll_interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(scheduler = %name, "scheduler stopped");
}

/// Handle to control a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl SchedulerHandle {
    /// Request shutdown and wait for the current tick to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
