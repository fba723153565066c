//! CLI argument definitions for grub.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create the ledger and seed the system account |
//! | `open-account` | Register a trader and their stock |
//! | `buy` / `sell` | Execute a trade on behalf of an account |
//! | `decay` / `dividends` / `snapshot` | Run one maintenance job now |
//! | `stock` / `market` / `portfolio` | Read-side reports |
//! | `run` | Run the market maker and scheduler until interrupted |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--home` | `$GRUB_HOME` or `~/.grub` | Directory holding `ledger.duckdb` |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! grub open-account alice ALICE --price 10
//! grub buy --as 2 ALICE --shares 5 --pretty
//! grub run --maker-interval-secs 30 --dividend-cadence biweekly
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use grub_core::DividendCadence;

/// Grub exchange: a closed economy where every user is a stock.
#[derive(Debug, Parser)]
#[command(
    name = "grub",
    author,
    version,
    about = "Grub exchange ledger, trading and background market",
    long_about = "Every account on the grub exchange is both a trader and a tradable stock. \
Prices move with each trade, drift on a timer, and decay back toward baseline when idle.\n\
\n\
Use 'grub <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Directory holding the ledger database. Falls back to `$GRUB_HOME`, then `~/.grub`.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the ledger schema and the MARKET system account.
    Init,

    /// Open a new account with its stock and starting balance.
    ///
    /// # Examples
    ///
    ///   grub open-account alice ALICE
    ///   grub open-account bob BOB --price 12.5 --balance 500
    OpenAccount(OpenAccountArgs),

    /// Buy shares of a stock, sized in shares or in grub.
    ///
    /// # Examples
    ///
    ///   grub buy --as 2 ALICE --shares 5
    ///   grub buy --as 2 ALICE --amount 25
    Buy(TradeArgs),

    /// Sell shares of a stock, sized in shares or in grub.
    Sell(TradeArgs),

    /// Decay every stock that has not traded in the last day.
    Decay,

    /// Pay dividends on every holding.
    Dividends,

    /// Record a market-wide snapshot.
    Snapshot,

    /// Price statistics for one stock.
    Stock(StockArgs),

    /// Economy totals and recent market snapshots.
    Market,

    /// Holdings of one account marked to market.
    Portfolio(PortfolioArgs),

    /// Run the market maker and maintenance scheduler until Ctrl-C.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct OpenAccountArgs {
    pub username: String,

    /// Ticker symbol for the account's stock.
    pub ticker: String,

    /// Starting share price.
    #[arg(long, default_value_t = 10.0)]
    pub price: f64,

    /// Shares outstanding; must be positive.
    #[arg(long, default_value_t = 1000)]
    pub shares: i64,

    /// Starting grub balance.
    #[arg(long, default_value_t = 100.0)]
    pub balance: f64,
}

#[derive(Debug, Args)]
pub struct TradeArgs {
    /// Account id placing the order.
    #[arg(long = "as", value_name = "ACCOUNT_ID")]
    pub actor: i64,

    /// Ticker of the stock to trade.
    pub ticker: String,

    /// Number of shares.
    #[arg(long, conflicts_with = "amount")]
    pub shares: Option<f64>,

    /// Grub to spend (buy) or receive (sell).
    #[arg(long)]
    pub amount: Option<f64>,
}

#[derive(Debug, Args)]
pub struct StockArgs {
    pub ticker: String,
}

#[derive(Debug, Args)]
pub struct PortfolioArgs {
    /// Account id whose holdings to list.
    pub account: i64,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between market maker ticks.
    #[arg(long, default_value_t = 60)]
    pub maker_interval_secs: u64,

    /// How often dividends are paid: daily or biweekly.
    #[arg(long, default_value_t = DividendCadence::Daily)]
    pub dividend_cadence: DividendCadence,

    /// Run only the maintenance scheduler.
    #[arg(long, default_value_t = false)]
    pub no_maker: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub duration_secs: Option<u64>,
}
