//! # Domain Types
//!
//! Validated value types shared by the engine and its background jobs.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AccountId`] | Ledger identifier of an account (and of its stock) |
//! | [`Ticker`] | Normalized, validated stock ticker |
//! | [`Side`] | Buy or sell |
//! | [`OrderSize`] | Share count or Grub amount of an order |
//! | [`UtcDateTime`] | UTC instant, persisted as epoch milliseconds |

mod order;
mod ticker;
mod timestamp;

pub use grub_ledger::TradeSide as Side;
pub use order::OrderSize;
pub use ticker::Ticker;
pub use timestamp::UtcDateTime;

/// Ledger identifier of an account. The same id names the account's stock.
pub type AccountId = i64;
