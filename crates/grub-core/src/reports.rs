//! Read-side views over the ledger used by reporting collaborators.

use std::time::Duration;

use grub_ledger::{
    HoldingRecord, Ledger, LedgerError, MarketSnapshotRecord, PricePointRecord, TransactionRecord,
};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Ticker, UtcDateTime};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Price statistics for one stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockStats {
    pub stock_id: AccountId,
    pub ticker: Ticker,
    pub current_price: f64,
    pub market_cap: f64,
    /// Absolute change against the last price recorded at least 24h ago.
    pub change_24h: f64,
    pub change_24h_percent: f64,
    pub volume_24h: f64,
    pub all_time_high: Option<f64>,
    pub all_time_low: Option<f64>,
}

/// Economy-wide totals plus recent snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub total_market_cap: f64,
    pub total_cash: f64,
    pub total_invested: f64,
    pub total_grub: f64,
    pub invested_percent: f64,
    pub total_stocks: usize,
    pub history: Vec<MarketSnapshotRecord>,
}

/// One holding marked to the stock's current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValue {
    pub stock_id: AccountId,
    pub ticker: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub market_value: f64,
}

/// Query helpers over a [`Ledger`].
#[derive(Clone)]
pub struct Reports {
    ledger: Ledger,
}

impl Reports {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Stats for `ticker` as of `now`; `None` when no such stock exists.
    pub fn stock_stats(
        &self,
        ticker: &Ticker,
        now: UtcDateTime,
    ) -> Result<Option<StockStats>, LedgerError> {
        let day_ago = now.minus(DAY).unix_millis();
        self.ledger.read(|tx| {
            let Some(stock) = tx.account_by_ticker(ticker.as_str())? else {
                return Ok(None);
            };
            let price_day_ago = tx.price_at(stock.id, day_ago)?;
            let (change_24h, change_24h_percent) = match price_day_ago {
                Some(before) if before > 0.0 => {
                    let change = stock.current_price - before;
                    (change, change / before * 100.0)
                }
                _ => (0.0, 0.0),
            };
            let range = tx.price_range(stock.id)?;

            Ok(Some(StockStats {
                stock_id: stock.id,
                ticker: ticker.clone(),
                current_price: stock.current_price,
                market_cap: stock.shares_outstanding as f64 * stock.current_price,
                change_24h,
                change_24h_percent,
                volume_24h: tx.volume_since(stock.id, day_ago)?,
                all_time_high: range.map(|(high, _)| high),
                all_time_low: range.map(|(_, low)| low),
            }))
        })
    }

    /// Live market totals with the last 30 days of snapshots.
    pub fn market_overview(&self, now: UtcDateTime) -> Result<MarketOverview, LedgerError> {
        let month_ago = now.minus(DAY * 30).unix_millis();
        self.ledger.read(|tx| {
            let totals = tx.market_totals()?;
            let total_stocks = tx
                .accounts()?
                .iter()
                .filter(|account| account.is_tradable())
                .count();
            Ok(MarketOverview {
                total_market_cap: totals.market_cap,
                total_cash: totals.cash,
                total_invested: totals.invested,
                total_grub: totals.total_grub(),
                invested_percent: totals.invested_percent(),
                total_stocks,
                history: tx.market_snapshots_since(month_ago)?,
            })
        })
    }

    pub fn price_history(
        &self,
        stock: AccountId,
        since: UtcDateTime,
    ) -> Result<Vec<PricePointRecord>, LedgerError> {
        self.ledger
            .read(|tx| tx.price_history_since(stock, since.unix_millis()))
    }

    pub fn recent_trades(
        &self,
        stock: Option<AccountId>,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.ledger.read(|tx| match stock {
            Some(stock) => tx.transactions_for_stock(stock, limit),
            None => tx.recent_transactions(limit),
        })
    }

    pub fn trades_by(
        &self,
        actor: AccountId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.ledger.read(|tx| tx.transactions_for_actor(actor, limit))
    }

    /// Every holding of `owner`, marked to current prices.
    pub fn portfolio(&self, owner: AccountId) -> Result<Vec<PositionValue>, LedgerError> {
        self.ledger.read(|tx| {
            tx.holdings_for_owner(owner)?
                .into_iter()
                .map(|holding| -> Result<PositionValue, LedgerError> {
                    let HoldingRecord {
                        stock_id,
                        quantity,
                        avg_price,
                        ..
                    } = holding;
                    let stock = tx.account_by_id(stock_id)?.ok_or_else(|| {
                        LedgerError::NotFound {
                            entity: "account",
                            key: stock_id.to_string(),
                        }
                    })?;
                    Ok(PositionValue {
                        stock_id,
                        ticker: stock.ticker,
                        quantity,
                        avg_price,
                        current_price: stock.current_price,
                        market_value: quantity * stock.current_price,
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grub_ledger::NewAccount;

    #[test]
    fn stock_stats_compare_against_price_a_day_ago() {
        let ledger = Ledger::open_in_memory().expect("ledger");
        let stock = ledger
            .open_account(
                &NewAccount {
                    username: "carol".to_string(),
                    ticker: "CAROL".to_string(),
                    initial_price: 10.0,
                    shares_outstanding: 1_000,
                    initial_balance: 0.0,
                },
                0,
            )
            .expect("account");
        let now = UtcDateTime::from_unix_millis(DAY.as_millis() as i64 * 3).expect("now");
        let two_days_ago = now.minus(DAY * 2).unix_millis();
        ledger
            .transact(|tx| {
                tx.insert_price_point(&PricePointRecord {
                    stock_id: stock.id,
                    price: 8.0,
                    recorded_at_ms: two_days_ago,
                })?;
                tx.update_price(stock.id, stock.version, 10.0).map(|_| ())
            })
            .expect("history");

        let stats = Reports::new(ledger)
            .stock_stats(&Ticker::parse("carol").expect("ticker"), now)
            .expect("query")
            .expect("stock exists");

        assert_eq!(stats.change_24h, 2.0);
        assert_eq!(stats.change_24h_percent, 25.0);
        assert_eq!(stats.all_time_low, Some(8.0));
        assert_eq!(stats.market_cap, 10_000.0);
        assert_eq!(stats.volume_24h, 0.0);
    }

    #[test]
    fn overview_counts_only_tradable_stocks() {
        let ledger = Ledger::open_in_memory().expect("ledger");
        ledger
            .open_account(
                &NewAccount {
                    username: "dave".to_string(),
                    ticker: "DAVE".to_string(),
                    initial_price: 10.0,
                    shares_outstanding: 1_000,
                    initial_balance: 50.0,
                },
                0,
            )
            .expect("account");

        let overview = Reports::new(ledger)
            .market_overview(UtcDateTime::now())
            .expect("overview");
        assert_eq!(overview.total_stocks, 1);
        assert_eq!(overview.total_cash, 50.0);
        assert_eq!(overview.total_market_cap, 10_000.0);
        assert_eq!(overview.invested_percent, 0.0);
    }
}
