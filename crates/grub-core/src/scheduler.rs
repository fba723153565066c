//! Timer-driven maintenance loop.
//!
//! Decay, dividends and market snapshots each run on their own interval. Ledger
//! work is synchronous, so every job runs on the blocking thread pool.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::maintenance::Maintenance;
use crate::JobError;

/// Runs [`Maintenance`] jobs on their configured schedules.
#[derive(Clone)]
pub struct Scheduler {
    maintenance: Maintenance,
}

impl Scheduler {
    pub fn new(maintenance: Maintenance) -> Self {
        Self { maintenance }
    }

    /// Run until `shutdown` flips to `true` or its sender drops.
    ///
    /// A market snapshot is recorded immediately; every other job first fires
    /// one full period after start. Shutdown is only observed between jobs.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) {
        let config = self.maintenance.config().clone();
        info!(
            decay_every_s = config.decay_interval.as_secs(),
            dividends = %config.dividend_cadence,
            snapshot_every_s = config.snapshot_interval.as_secs(),
            "scheduler started"
        );

        self.snapshot().await;

        let mut decay = delayed_interval(config.decay_interval);
        let mut dividends = delayed_interval(config.dividend_cadence.period());
        let mut snapshots = delayed_interval(config.snapshot_interval);
        loop {
            tokio::select! {
                _ = decay.tick() => {
                    let maintenance = self.maintenance.clone();
                    if let Err(error) = run_blocking(move || maintenance.run_daily_decay()).await {
                        warn!(%error, "decay job failed");
                    }
                }
                _ = dividends.tick() => {
                    let maintenance = self.maintenance.clone();
                    if let Err(error) = run_blocking(move || maintenance.run_dividends()).await {
                        warn!(%error, "dividend job failed");
                    }
                }
                _ = snapshots.tick() => self.snapshot().await,
                () = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        info!("scheduler stopped");
    }

    async fn snapshot(&self) {
        let maintenance = self.maintenance.clone();
        if let Err(error) = run_blocking(move || maintenance.record_market_snapshot()).await {
            warn!(%error, "market snapshot failed");
        }
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run a synchronous job on tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(job: F) -> Result<T, JobError>
where
    F: FnOnce() -> Result<T, JobError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|error| JobError::Join(error.to_string()))?
}

/// Resolve once shutdown is requested or the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grub_ledger::Ledger;

    use crate::config::MaintenanceConfig;

    #[tokio::test]
    async fn records_a_snapshot_at_startup_and_stops_on_signal() {
        let ledger = Ledger::open_in_memory().expect("ledger");
        let maintenance = Maintenance::new(ledger.clone()).with_config(MaintenanceConfig {
            snapshot_interval: Duration::from_secs(3600),
            ..MaintenanceConfig::default()
        });
        let (stop, shutdown) = watch::channel(false);

        let handle = tokio::spawn(Scheduler::new(maintenance).run_until(shutdown));
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.send(true).expect("scheduler listening");
        handle.await.expect("scheduler exits cleanly");

        let snapshots = ledger
            .read(|tx| tx.market_snapshots_since(0))
            .expect("snapshots");
        assert_eq!(snapshots.len(), 1);
    }
}
