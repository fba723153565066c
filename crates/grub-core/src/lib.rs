//! # Grub Core
//!
//! Trade execution and pricing engine for the Grub exchange, a closed economy
//! in which every participant is both a trader and a tradable stock.
//!
//! ## Overview
//!
//! - **Pricing** turns a signed share count into a post-trade price and a
//!   slippage-inclusive execution price, and pulls idle prices toward baseline.
//! - **Trading** applies a buy or sell to the ledger as one atomic unit.
//! - **Market maker** drifts every price on a timer and snapshots portfolios.
//! - **Maintenance** decays idle stocks, pays dividends and records market
//!   snapshots, driven by the **scheduler**.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`collaborators`] | Notifier, sentiment and account directory seams |
//! | [`config`] | Market maker and maintenance settings |
//! | [`domain`] | Tickers, order sizes, timestamps |
//! | [`engine`] | Trade execution |
//! | [`maintenance`] | Decay, dividends, market snapshots |
//! | [`market_maker`] | Background price drift |
//! | [`pricing`] | Impact, execution and decay math |
//! | [`reports`] | Read-side statistics |
//! | [`retry`] | Backoff for conflicting writes |
//! | [`scheduler`] | Timer loop for maintenance jobs |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grub_core::TradingEngine;
//! use grub_ledger::Ledger;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = TradingEngine::new(Ledger::open_default()?);
//!     let trade = engine.execute_buy(1, "ALICE", 5.0, 0.0)?;
//!     println!("bought {} at {:.2}", trade.shares, trade.exec_price);
//!     Ok(())
//! }
//! ```

pub mod collaborators;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod market_maker;
pub mod pricing;
pub mod reports;
pub mod retry;
pub mod scheduler;

pub use collaborators::{
    AccountDirectory, LogNotifier, NoSentiment, Notification, Notifier, SentimentSource,
    StaticSentiment,
};
pub use config::{DividendCadence, MaintenanceConfig, MarketMakerConfig};
pub use domain::{AccountId, OrderSize, Side, Ticker, UtcDateTime};
pub use engine::{ExecutedTrade, TradingEngine, HOLDING_EPSILON};
pub use error::{CollaboratorError, JobError, TradeError, ValidationError};
pub use maintenance::{DecayReport, DividendReport, Maintenance};
pub use market_maker::{MarketMaker, TickReport};
pub use pricing::{Execution, PricingModel};
pub use reports::{MarketOverview, PositionValue, Reports, StockStats};
pub use retry::{Backoff, RetryConfig, RetryError};
pub use scheduler::Scheduler;
