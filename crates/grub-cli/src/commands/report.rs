use grub_core::{PositionValue, Reports, StockStats, Ticker, TradeError, UtcDateTime};
use grub_ledger::{Ledger, TransactionRecord};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{PortfolioArgs, StockArgs};
use crate::error::CliError;

const RECENT_TRADES: usize = 20;

#[derive(Debug, Serialize)]
struct StockResponseData {
    stats: StockStats,
    recent_trades: Vec<TransactionRecord>,
}

#[derive(Debug, Serialize)]
struct PortfolioResponseData {
    account_id: i64,
    cash: f64,
    positions: Vec<PositionValue>,
    holdings_value: f64,
}

pub fn stock(args: &StockArgs, ledger: &Ledger) -> Result<Value, CliError> {
    let ticker = Ticker::parse(&args.ticker)?;
    let reports = Reports::new(ledger.clone());
    let stats = reports
        .stock_stats(&ticker, UtcDateTime::now())?
        .ok_or_else(|| TradeError::StockNotFound {
            ticker: ticker.to_string(),
        })?;
    let trades = reports.recent_trades(Some(stats.stock_id), RECENT_TRADES)?;
    Ok(serde_json::to_value(StockResponseData {
        stats,
        recent_trades: trades,
    })?)
}

pub fn market(ledger: &Ledger) -> Result<Value, CliError> {
    let overview = Reports::new(ledger.clone()).market_overview(UtcDateTime::now())?;
    Ok(serde_json::to_value(overview)?)
}

pub fn portfolio(args: &PortfolioArgs, ledger: &Ledger) -> Result<Value, CliError> {
    let balance = ledger
        .balance(args.account)?
        .ok_or(TradeError::BalanceNotFound {
            account_id: args.account,
        })?;
    let positions = Reports::new(ledger.clone()).portfolio(args.account)?;
    let holdings_value: f64 = positions.iter().map(|position| position.market_value).sum();
    Ok(serde_json::to_value(PortfolioResponseData {
        account_id: args.account,
        cash: balance.grub,
        positions,
        holdings_value,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_stock_is_unknown_then_report_fails_as_not_found() {
        let ledger = Ledger::open_in_memory().expect("ledger");

        let error = stock(
            &StockArgs {
                ticker: String::from("NOBODY"),
            },
            &ledger,
        )
        .expect_err("unknown stock");

        assert!(matches!(
            error,
            CliError::Trade(TradeError::StockNotFound { .. })
        ));
    }

    #[test]
    fn when_account_has_no_holdings_then_portfolio_is_cash_only() {
        let ledger = Ledger::open_in_memory().expect("ledger");
        let market = ledger
            .account_by_username(grub_ledger::MARKET_USERNAME)
            .expect("read")
            .expect("seeded");

        let data = portfolio(&PortfolioArgs { account: market.id }, &ledger).expect("portfolio");

        assert_eq!(data["positions"].as_array().map(Vec::len), Some(0));
        assert_eq!(data["holdings_value"], 0.0);
    }
}
