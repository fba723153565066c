//! Row types persisted by the ledger.
//!
//! Timestamps are stored as Unix epoch milliseconds; callers own the clock.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// One participant, who is simultaneously a trader and a tradable stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub ticker: String,
    pub current_price: f64,
    /// Zero for the non-tradable system account.
    pub shares_outstanding: i64,
    /// Bumped on every price write; used for optimistic concurrency.
    pub version: i64,
    pub created_at_ms: i64,
}

impl AccountRecord {
    pub fn is_tradable(&self) -> bool {
        self.shares_outstanding > 0
    }
}

/// Input for opening a new account.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub username: String,
    pub ticker: String,
    pub initial_price: f64,
    pub shares_outstanding: i64,
    pub initial_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub account_id: i64,
    pub grub: f64,
    pub last_claim_ms: Option<i64>,
}

/// Shares of `stock_id` owned by `owner_id` with their cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub owner_id: i64,
    pub stock_id: i64,
    pub quantity: f64,
    pub avg_price: f64,
}

/// Stored side of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        match value {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(LedgerError::InvalidData(format!(
                "unknown trade side '{other}'"
            ))),
        }
    }
}

impl Display for TradeSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of one executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub actor_id: i64,
    pub stock_id: i64,
    pub side: TradeSide,
    pub shares: f64,
    /// Realized execution price, not the pre-trade spot price.
    pub price_per_share: f64,
    pub total: f64,
    pub executed_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePointRecord {
    pub stock_id: i64,
    pub price: f64,
    pub recorded_at_ms: i64,
}

/// Economy-wide aggregates at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshotRecord {
    pub total_market_cap: f64,
    pub total_invested: f64,
    pub total_cash: f64,
    pub total_grub: f64,
    pub recorded_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshotRecord {
    pub account_id: i64,
    pub total_value: f64,
    pub cash: f64,
    pub recorded_at_ms: i64,
}

/// Live economy totals computed from the current ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketTotals {
    pub market_cap: f64,
    pub cash: f64,
    pub invested: f64,
}

impl MarketTotals {
    pub fn total_grub(&self) -> f64 {
        self.cash + self.invested
    }

    /// Share of all Grub currently held as stock, in percent.
    pub fn invested_percent(&self) -> f64 {
        let total = self.total_grub();
        if total > 0.0 {
            self.invested / total * 100.0
        } else {
            0.0
        }
    }
}

/// Cash and marked holdings for one account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountWealth {
    pub account_id: i64,
    pub cash: f64,
    pub holdings_value: f64,
    pub total_value: f64,
}
