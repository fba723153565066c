use grub_core::{PricingModel, Ticker, UtcDateTime};
use grub_ledger::{AccountRecord, Ledger, NewAccount, MARKET_USERNAME};
use serde::Serialize;
use serde_json::Value;

use crate::cli::OpenAccountArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct InitResponseData {
    db_path: Option<String>,
    market_account: Option<AccountRecord>,
}

#[derive(Debug, Serialize)]
struct OpenAccountResponseData {
    account: AccountRecord,
    balance: f64,
}

pub fn init(ledger: &Ledger) -> Result<Value, CliError> {
    // Opening the ledger already migrated and seeded it.
    let data = InitResponseData {
        db_path: ledger.db_path().map(|path| path.display().to_string()),
        market_account: ledger.account_by_username(MARKET_USERNAME)?,
    };
    Ok(serde_json::to_value(data)?)
}

pub fn open(args: &OpenAccountArgs, ledger: &Ledger) -> Result<Value, CliError> {
    let username = args.username.trim();
    if username.is_empty() {
        return Err(CliError::Command(String::from("username must not be empty")));
    }
    let ticker = Ticker::parse(&args.ticker)?;
    if ticker.as_str() == MARKET_USERNAME || username == MARKET_USERNAME {
        return Err(CliError::Command(format!(
            "'{MARKET_USERNAME}' is reserved for the system account"
        )));
    }
    if args.shares <= 0 {
        return Err(CliError::Command(String::from(
            "shares outstanding must be positive",
        )));
    }

    let pricing = PricingModel::default();
    if !args.price.is_finite() || args.price < pricing.min_price || args.price > pricing.max_price
    {
        return Err(CliError::Command(format!(
            "price must be between {:.2} and {:.2}",
            pricing.min_price, pricing.max_price
        )));
    }
    if !args.balance.is_finite() || args.balance < 0.0 {
        return Err(CliError::Command(String::from(
            "balance must be a non-negative number",
        )));
    }

    let account = ledger.open_account(
        &NewAccount {
            username: username.to_string(),
            ticker: ticker.as_str().to_string(),
            initial_price: args.price,
            shares_outstanding: args.shares,
            initial_balance: args.balance,
        },
        UtcDateTime::now().unix_millis(),
    )?;
    tracing::info!(account_id = account.id, ticker = %account.ticker, "account opened");

    Ok(serde_json::to_value(OpenAccountResponseData {
        account,
        balance: args.balance,
    })?)
}
