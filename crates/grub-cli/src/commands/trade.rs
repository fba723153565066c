use grub_core::TradingEngine;
use grub_ledger::Ledger;
use serde_json::Value;

use crate::cli::TradeArgs;
use crate::error::CliError;

pub fn buy(args: &TradeArgs, ledger: &Ledger) -> Result<Value, CliError> {
    let (shares, amount) = order_size(args);
    let trade = engine(ledger).execute_buy(args.actor, &args.ticker, shares, amount)?;
    Ok(serde_json::to_value(trade)?)
}

pub fn sell(args: &TradeArgs, ledger: &Ledger) -> Result<Value, CliError> {
    let (shares, amount) = order_size(args);
    let trade = engine(ledger).execute_sell(args.actor, &args.ticker, shares, amount)?;
    Ok(serde_json::to_value(trade)?)
}

fn engine(ledger: &Ledger) -> TradingEngine {
    TradingEngine::new(ledger.clone())
}

/// Missing fields map to zero, which the engine treats as unset.
fn order_size(args: &TradeArgs) -> (f64, f64) {
    (args.shares.unwrap_or(0.0), args.amount.unwrap_or(0.0))
}
