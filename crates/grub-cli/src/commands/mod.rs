mod account;
mod jobs;
mod report;
mod serve;
mod trade;

use grub_ledger::{Ledger, LedgerConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let ledger = open_ledger(cli)?;

    match &cli.command {
        Command::Init => account::init(&ledger),
        Command::OpenAccount(args) => account::open(args, &ledger),
        Command::Buy(args) => trade::buy(args, &ledger),
        Command::Sell(args) => trade::sell(args, &ledger),
        Command::Decay => jobs::decay(&ledger),
        Command::Dividends => jobs::dividends(&ledger),
        Command::Snapshot => jobs::snapshot(&ledger),
        Command::Stock(args) => report::stock(args, &ledger),
        Command::Market => report::market(&ledger),
        Command::Portfolio(args) => report::portfolio(args, &ledger),
        Command::Run(args) => serve::run(args, ledger).await,
    }
}

/// Open the ledger under `--home`, or the default location.
fn open_ledger(cli: &Cli) -> Result<Ledger, CliError> {
    let config = match &cli.home {
        Some(home) => LedgerConfig::at_home(home),
        None => LedgerConfig::default(),
    };
    Ok(Ledger::open(config)?)
}
