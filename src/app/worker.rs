//! Background scheduler driving the periodic jobs.

use async_trait::async_trait;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::domain::AppError;

use super::disbursement::DisbursementService;
use super::webhook::WebhookService;

/// Unit of periodic work
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run a single tick; returns the number of items handled
    async fn run_once(&self) -> Result<usize, AppError>;
}

pub struct DisbursementInitiationJob(pub Arc<DisbursementService>);

#[async_trait]
impl Job for DisbursementInitiationJob {
    fn name(&self) -> &'static str {
        "disbursement_initiation"
    }

    async fn run_once(&self) -> Result<usize, AppError> {
        self.0.run_initiation_cycle().await
    }
}

pub struct DisbursementReconciliationJob(pub Arc<DisbursementService>);

#[async_trait]
impl Job for DisbursementReconciliationJob {
    fn name(&self) -> &'static str {
        "disbursement_reconciliation"
    }

    async fn run_once(&self) -> Result<usize, AppError> {
        self.0.run_reconciliation_cycle().await
    }
}

pub struct WebhookDeliveryJob(pub Arc<WebhookService>);

#[async_trait]
impl Job for WebhookDeliveryJob {
    fn name(&self) -> &'static str {
        "webhook_delivery"
    }

    async fn run_once(&self) -> Result<usize, AppError> {
        self.0.process_due().await
    }
}

pub struct BankTransferConfirmationJob(pub Arc<DisbursementService>);

#[async_trait]
impl Job for BankTransferConfirmationJob {
    fn name(&self) -> &'static str {
        "bank_transfer_confirmation"
    }

    async fn run_once(&self) -> Result<usize, AppError> {
        self.0.run_bank_transfer_cycle().await
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub initiation_interval: Duration,
    pub reconciliation_interval: Duration,
    pub webhook_interval: Duration,
    pub bank_transfer_interval: Duration,
    /// Ticks running longer than this are logged. A tick is never cut
    /// short; outbound calls carry their own client timeouts.
    pub slow_tick_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initiation_interval: Duration::from_secs(60),
            reconciliation_interval: Duration::from_secs(120),
            webhook_interval: Duration::from_secs(15),
            bank_transfer_interval: Duration::from_secs(300),
            slow_tick_threshold: Duration::from_secs(240),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, fallback: Duration| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };
        Self {
            enabled: env::var("ENABLE_SCHEDULER")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.enabled),
            initiation_interval: secs("INITIATION_INTERVAL_SECS", defaults.initiation_interval),
            reconciliation_interval: secs(
                "RECONCILIATION_INTERVAL_SECS",
                defaults.reconciliation_interval,
            ),
            webhook_interval: secs("WEBHOOK_INTERVAL_SECS", defaults.webhook_interval),
            bank_transfer_interval: secs(
                "BANK_TRANSFER_INTERVAL_SECS",
                defaults.bank_transfer_interval,
            ),
            slow_tick_threshold: secs("JOB_SLOW_TICK_SECS", defaults.slow_tick_threshold),
        }
    }
}

/// Owns one ticker task per job and the shared shutdown channel
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Spawn the four engine jobs
    #[must_use]
    pub fn start(
        config: &SchedulerConfig,
        disbursements: Arc<DisbursementService>,
        webhooks: Arc<WebhookService>,
    ) -> Self {
        let mut scheduler = Self::new();
        let slow_tick = config.slow_tick_threshold;
        scheduler.spawn(
            Arc::new(DisbursementInitiationJob(Arc::clone(&disbursements))),
            config.initiation_interval,
            slow_tick,
        );
        scheduler.spawn(
            Arc::new(DisbursementReconciliationJob(Arc::clone(&disbursements))),
            config.reconciliation_interval,
            slow_tick,
        );
        scheduler.spawn(
            Arc::new(WebhookDeliveryJob(webhooks)),
            config.webhook_interval,
            slow_tick,
        );
        scheduler.spawn(
            Arc::new(BankTransferConfirmationJob(disbursements)),
            config.bank_transfer_interval,
            slow_tick,
        );
        scheduler
    }

    pub fn spawn(&mut self, job: Arc<dyn Job>, period: Duration, slow_tick: Duration) {
        let name = job.name();
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(run_job(job, period, slow_tick, shutdown_rx));
        info!(job = name, period_secs = period.as_secs_f64(), "Job scheduled");
        self.handles.push((name, handle));
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal every loop to stop and wait for in-flight ticks to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(job = name, error = ?e, "Job task panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_job(
    job: Arc<dyn Job>,
    period: Duration,
    slow_tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let name = job.name();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Runs to completion so no transition is separated from its side effect
                let started = Instant::now();
                match job.run_once().await {
                    Ok(0) => {}
                    Ok(count) => debug!(job = name, count = count, "Job tick complete"),
                    Err(e) => error!(job = name, error = ?e, "Job tick failed"),
                }
                let elapsed = started.elapsed();
                if elapsed > slow_tick {
                    warn!(job = name, elapsed_secs = elapsed.as_secs_f64(), "Job tick ran long");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!(job = name, "Job received shutdown signal");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> Result<usize, AppError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.runs.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.webhook_interval, Duration::from_secs(15));
        assert!(config.slow_tick_threshold < config.bank_transfer_interval);
    }

    #[tokio::test]
    async fn test_job_ticks_until_shutdown() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let mut scheduler = Scheduler::new();
        scheduler.spawn(job.clone(), Duration::from_millis(10), Duration::from_secs(1));
        assert_eq!(scheduler.job_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;

        let runs = job.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected several ticks, got {}", runs);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn test_slow_tick_runs_to_completion() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            delay: Duration::from_millis(80),
        });
        let mut scheduler = Scheduler::new();
        scheduler.spawn(job.clone(), Duration::from_millis(10), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Shutdown waits for the tick in flight instead of dropping it
        scheduler.shutdown().await;

        assert!(job.runs.load(Ordering::SeqCst) >= 1);
    }
}
