use std::time::Duration;

use grub_core::{Maintenance, MaintenanceConfig, MarketMaker, MarketMakerConfig, Scheduler};
use grub_ledger::Ledger;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct RunResponseData {
    stopped_by: &'static str,
    market_maker: bool,
    uptime_secs: u64,
}

/// Run background jobs until Ctrl-C or the requested duration elapses.
pub async fn run(args: &RunArgs, ledger: Ledger) -> Result<Value, CliError> {
    if args.maker_interval_secs == 0 {
        return Err(CliError::Command(String::from(
            "maker interval must be at least one second",
        )));
    }

    let started = tokio::time::Instant::now();
    let (stop, shutdown) = watch::channel(false);

    let maintenance = Maintenance::new(ledger.clone()).with_config(MaintenanceConfig {
        dividend_cadence: args.dividend_cadence,
        ..MaintenanceConfig::default()
    });
    let scheduler = tokio::spawn(Scheduler::new(maintenance).run_until(shutdown.clone()));

    let maker = if args.no_maker {
        None
    } else {
        let config = MarketMakerConfig {
            interval: Duration::from_secs(args.maker_interval_secs),
            ..MarketMakerConfig::default()
        };
        Some(tokio::spawn(
            MarketMaker::new(ledger).with_config(config).run_until(shutdown),
        ))
    };

    let stopped_by = match args.duration_secs {
        Some(secs) => tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                "interrupt"
            }
            () = tokio::time::sleep(Duration::from_secs(secs)) => "duration",
        },
        None => {
            tokio::signal::ctrl_c().await?;
            "interrupt"
        }
    };
    info!(stopped_by, "shutting down background jobs");

    // Receivers may already be gone if a task exited early.
    let _ = stop.send(true);
    join(scheduler).await?;
    if let Some(maker) = maker {
        join(maker).await?;
    }

    Ok(serde_json::to_value(RunResponseData {
        stopped_by,
        market_maker: !args.no_maker,
        uptime_secs: started.elapsed().as_secs(),
    })?)
}

async fn join(handle: tokio::task::JoinHandle<()>) -> Result<(), CliError> {
    handle
        .await
        .map_err(|error| CliError::Command(format!("background task failed: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grub_core::DividendCadence;

    #[tokio::test]
    async fn when_duration_elapses_then_jobs_stop_and_a_snapshot_exists() {
        // Given
        let ledger = Ledger::open_in_memory().expect("ledger");
        let args = RunArgs {
            maker_interval_secs: 60,
            dividend_cadence: DividendCadence::Daily,
            no_maker: false,
            duration_secs: Some(1),
        };

        // When
        let data = run(&args, ledger.clone()).await.expect("run");

        // Then
        assert_eq!(data["stopped_by"], "duration");
        let snapshots = ledger
            .read(|tx| tx.market_snapshots_since(0))
            .expect("snapshots");
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn when_interval_is_zero_then_run_is_rejected() {
        let ledger = Ledger::open_in_memory().expect("ledger");
        let args = RunArgs {
            maker_interval_secs: 0,
            dividend_cadence: DividendCadence::Daily,
            no_maker: true,
            duration_secs: Some(1),
        };

        assert!(run(&args, ledger).await.is_err());
    }
}
