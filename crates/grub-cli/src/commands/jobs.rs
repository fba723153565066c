use grub_core::Maintenance;
use grub_ledger::Ledger;
use serde_json::Value;

use crate::error::CliError;

pub fn decay(ledger: &Ledger) -> Result<Value, CliError> {
    let report = Maintenance::new(ledger.clone()).run_daily_decay()?;
    Ok(serde_json::to_value(report)?)
}

pub fn dividends(ledger: &Ledger) -> Result<Value, CliError> {
    let report = Maintenance::new(ledger.clone()).run_dividends()?;
    Ok(serde_json::to_value(report)?)
}

pub fn snapshot(ledger: &Ledger) -> Result<Value, CliError> {
    let snapshot = Maintenance::new(ledger.clone()).record_market_snapshot()?;
    Ok(serde_json::to_value(snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_ledger_is_empty_then_jobs_report_nothing_to_do() {
        let ledger = Ledger::open_in_memory().expect("ledger");

        let decayed = decay(&ledger).expect("decay");
        let paid = dividends(&ledger).expect("dividends");

        assert_eq!(decayed["candidates"], 0);
        assert_eq!(paid["paid"], 0);
    }

    #[test]
    fn when_snapshot_runs_then_it_is_persisted() {
        let ledger = Ledger::open_in_memory().expect("ledger");

        snapshot(&ledger).expect("snapshot");

        let stored = ledger
            .read(|tx| tx.market_snapshots_since(0))
            .expect("snapshots");
        assert_eq!(stored.len(), 1);
    }
}
