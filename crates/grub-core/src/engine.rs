//! Trade execution.
//!
//! A trade is one ledger transaction. Every read that feeds the pricing math
//! happens inside it, and the stock's price is written first with a version
//! check, so two trades racing on the same stock cannot both commit from the
//! same starting price. The loser rolls back and is re-run from scratch.

use std::sync::Arc;

use grub_ledger::{
    AccountRecord, HoldingRecord, Ledger, LedgerTx, PricePointRecord, TransactionRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{AccountDirectory, LogNotifier, Notification, Notifier};
use crate::pricing::{round_cost, round_proceeds, round_shares, Execution, PricingModel};
use crate::retry::{RetryConfig, RetryError};
use crate::{AccountId, OrderSize, Side, Ticker, TradeError, UtcDateTime};

/// Holdings at or below this many shares are deleted instead of stored.
pub const HOLDING_EPSILON: f64 = 0.0001;

/// Detail of a committed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub transaction_id: String,
    pub actor_id: AccountId,
    /// Empty when the username lookup failed.
    pub actor_username: String,
    pub stock_id: AccountId,
    pub ticker: Ticker,
    pub side: Side,
    pub shares: f64,
    /// Realized per-share price including slippage.
    pub exec_price: f64,
    pub total: f64,
    /// Spot price of the stock after the trade.
    pub new_price: f64,
    pub executed_at: UtcDateTime,
}

/// What a committed ledger transaction produced, before best-effort follow-ups.
struct Committed {
    record: TransactionRecord,
    stock: AccountRecord,
    ticker: Ticker,
    new_price: f64,
}

/// Executes buys and sells against the ledger.
#[derive(Clone)]
pub struct TradingEngine {
    ledger: Ledger,
    pricing: PricingModel,
    retry: RetryConfig,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn AccountDirectory>,
}

impl TradingEngine {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            directory: Arc::new(ledger.clone()),
            ledger,
            pricing: PricingModel::default(),
            retry: RetryConfig::default(),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_pricing(mut self, pricing: PricingModel) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn AccountDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pricing(&self) -> &PricingModel {
        &self.pricing
    }

    /// Buy `ticker` for `actor`. Exactly one of `shares` and `grub_amount` must be non-zero.
    pub fn execute_buy(
        &self,
        actor: AccountId,
        ticker: &str,
        shares: f64,
        grub_amount: f64,
    ) -> Result<ExecutedTrade, TradeError> {
        self.execute_request(actor, ticker, Side::Buy, shares, grub_amount)
    }

    /// Sell `ticker` for `actor`. Exactly one of `shares` and `grub_amount` must be non-zero.
    pub fn execute_sell(
        &self,
        actor: AccountId,
        ticker: &str,
        shares: f64,
        grub_amount: f64,
    ) -> Result<ExecutedTrade, TradeError> {
        self.execute_request(actor, ticker, Side::Sell, shares, grub_amount)
    }

    fn execute_request(
        &self,
        actor: AccountId,
        ticker: &str,
        side: Side,
        shares: f64,
        grub_amount: f64,
    ) -> Result<ExecutedTrade, TradeError> {
        let ticker = Ticker::parse(ticker).map_err(|_| TradeError::StockNotFound {
            ticker: ticker.trim().to_string(),
        })?;
        let order = OrderSize::from_request(shares, grub_amount)?;
        self.execute(actor, &ticker, side, order)
    }

    /// Execute one trade atomically, retrying on write conflicts.
    pub fn execute(
        &self,
        actor: AccountId,
        ticker: &Ticker,
        side: Side,
        order: OrderSize,
    ) -> Result<ExecutedTrade, TradeError> {
        let committed = self
            .retry
            .run(
                || {
                    let now = UtcDateTime::now();
                    self.ledger
                        .transact(|tx| self.apply_trade(tx, actor, ticker, side, order, now))
                },
                TradeError::is_conflict,
            )
            .map_err(|error| match error {
                RetryError::Exhausted { attempts, .. } => {
                    warn!(actor, ticker = %ticker, %side, attempts, "trade abandoned after conflicts");
                    TradeError::Contention { attempts }
                }
                RetryError::Fatal(error) => error,
            })?;

        info!(
            actor,
            ticker = %committed.ticker,
            %side,
            shares = committed.record.shares,
            exec_price = committed.record.price_per_share,
            total = committed.record.total,
            new_price = committed.new_price,
            "trade executed"
        );
        Ok(self.follow_up(committed))
    }

    fn apply_trade(
        &self,
        tx: &LedgerTx<'_>,
        actor: AccountId,
        ticker: &Ticker,
        side: Side,
        order: OrderSize,
        now: UtcDateTime,
    ) -> Result<Committed, TradeError> {
        let stock = tx
            .account_by_ticker(ticker.as_str())?
            .ok_or_else(|| TradeError::StockNotFound {
                ticker: ticker.to_string(),
            })?;
        if !stock.is_tradable() {
            return Err(TradeError::NotTradable {
                ticker: ticker.to_string(),
            });
        }
        if side == Side::Buy && stock.id == actor {
            return Err(TradeError::SelfTrade);
        }

        let shares = self.resolve_shares(side, order, &stock)?;
        let execution =
            self.pricing
                .execution_for(side, stock.current_price, shares, stock.shares_outstanding);
        let balance = tx
            .balance(actor)?
            .ok_or(TradeError::BalanceNotFound { account_id: actor })?;
        let holding = tx.holding(actor, stock.id)?;

        let total = match side {
            Side::Buy => {
                let cost = round_cost(shares, execution.exec_price);
                if balance.grub < cost {
                    return Err(TradeError::InsufficientBalance {
                        required: cost,
                        available: balance.grub,
                    });
                }
                cost
            }
            Side::Sell => {
                let held = round_shares(holding.as_ref().ok_or(TradeError::NoShares)?.quantity);
                if shares > held {
                    return Err(TradeError::InsufficientShares {
                        requested: shares,
                        held,
                    });
                }
                round_proceeds(shares, execution.exec_price)
            }
        };

        let now_ms = now.unix_millis();
        tx.update_price(stock.id, stock.version, execution.new_price)?;
        match side {
            Side::Buy => {
                tx.adjust_balance(actor, -total)?;
                let holding = accumulate(holding, actor, stock.id, shares, execution);
                tx.put_holding(&holding, now_ms)?;
                let appreciation = self.pricing.appreciation(total);
                if appreciation > 0.0 {
                    tx.adjust_balance(stock.id, appreciation)?;
                }
            }
            Side::Sell => {
                tx.adjust_balance(actor, total)?;
                if let Some(mut holding) = holding {
                    holding.quantity = round_shares(holding.quantity - shares);
                    if holding.quantity <= HOLDING_EPSILON {
                        tx.delete_holding(actor, stock.id)?;
                    } else {
                        tx.put_holding(&holding, now_ms)?;
                    }
                }
            }
        }

        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            actor_id: actor,
            stock_id: stock.id,
            side,
            shares,
            price_per_share: execution.exec_price,
            total,
            executed_at_ms: now_ms,
        };
        tx.insert_transaction(&record)?;
        tx.insert_price_point(&PricePointRecord {
            stock_id: stock.id,
            price: execution.new_price,
            recorded_at_ms: now_ms,
        })?;

        Ok(Committed {
            record,
            stock,
            ticker: ticker.clone(),
            new_price: execution.new_price,
        })
    }

    /// Turn an order into a concrete share count at 4 decimal places.
    ///
    /// Amount orders are sized against the execution price, not the spot price:
    /// estimate at spot, price that estimate, then re-derive shares at the
    /// resulting execution price.
    fn resolve_shares(
        &self,
        side: Side,
        order: OrderSize,
        stock: &AccountRecord,
    ) -> Result<f64, TradeError> {
        let shares = match order {
            OrderSize::Shares(shares) => shares,
            OrderSize::Amount(grub) => {
                let estimate = grub / stock.current_price;
                let first_pass = self.pricing.execution_for(
                    side,
                    stock.current_price,
                    estimate,
                    stock.shares_outstanding,
                );
                grub / first_pass.exec_price
            }
        };

        let shares = round_shares(shares);
        if !shares.is_finite() || shares <= 0.0 {
            return Err(TradeError::AmountTooSmall);
        }
        Ok(shares)
    }

    /// Best-effort work after commit; failures are logged and never undo the trade.
    fn follow_up(&self, committed: Committed) -> ExecutedTrade {
        let Committed {
            record,
            stock,
            ticker,
            new_price,
        } = committed;

        let actor_username = match self.directory.username(record.actor_id) {
            Ok(Some(username)) => username,
            Ok(None) => String::new(),
            Err(error) => {
                warn!(actor = record.actor_id, %error, "username lookup failed");
                String::new()
            }
        };

        if stock.id != record.actor_id {
            let notification = match record.side {
                Side::Buy => Notification::TradeBuy {
                    recipient: stock.id,
                    actor_username: actor_username.clone(),
                    ticker: ticker.clone(),
                    shares: record.shares,
                },
                Side::Sell => Notification::TradeSell {
                    recipient: stock.id,
                    actor_username: actor_username.clone(),
                    ticker: ticker.clone(),
                    shares: record.shares,
                },
            };
            if let Err(error) = self.notifier.notify(&notification) {
                warn!(recipient = stock.id, %error, "trade notification failed");
            }
        }
        if let Err(error) = self.notifier.after_trade(record.actor_id) {
            warn!(actor = record.actor_id, %error, "after-trade hook failed");
        }

        ExecutedTrade {
            executed_at: UtcDateTime::from_unix_millis(record.executed_at_ms)
                .unwrap_or_else(|_| UtcDateTime::now()),
            transaction_id: record.id,
            actor_id: record.actor_id,
            actor_username,
            stock_id: stock.id,
            ticker,
            side: record.side,
            shares: record.shares,
            exec_price: record.price_per_share,
            total: record.total,
            new_price,
        }
    }
}

/// Add a buy to an existing holding, volume-weighting the average price.
fn accumulate(
    existing: Option<HoldingRecord>,
    owner_id: AccountId,
    stock_id: AccountId,
    shares: f64,
    execution: Execution,
) -> HoldingRecord {
    match existing {
        Some(holding) => {
            let quantity = round_shares(holding.quantity + shares);
            let cost_basis = holding.avg_price * holding.quantity + execution.exec_price * shares;
            HoldingRecord {
                quantity,
                avg_price: cost_basis / quantity,
                ..holding
            }
        }
        None => HoldingRecord {
            owner_id,
            stock_id,
            quantity: shares,
            avg_price: execution.exec_price,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grub_ledger::NewAccount;

    fn engine_with_accounts() -> (TradingEngine, AccountRecord, AccountRecord) {
        let ledger = Ledger::open_in_memory().expect("ledger");
        let open = |username: &str, ticker: &str, balance: f64| {
            ledger
                .open_account(
                    &NewAccount {
                        username: username.to_string(),
                        ticker: ticker.to_string(),
                        initial_price: 10.0,
                        shares_outstanding: 1_000,
                        initial_balance: balance,
                    },
                    0,
                )
                .expect("open account")
        };
        let alice = open("alice", "ALICE", 200.0);
        let bob = open("bob", "BOB", 100.0);
        (TradingEngine::new(ledger), alice, bob)
    }

    #[test]
    fn amount_orders_are_sized_at_the_execution_price() {
        let (engine, alice, _bob) = engine_with_accounts();

        let trade = engine
            .execute_buy(alice.id, "bob", 0.0, 50.0)
            .expect("buy by amount");

        assert!(trade.shares < 5.0, "slippage must reduce shares below spot estimate");
        assert!(trade.exec_price > 10.0);
        assert!((trade.total - 50.0).abs() <= 0.05, "total {} near 50", trade.total);
    }

    #[test]
    fn holding_average_is_volume_weighted() {
        let existing = HoldingRecord {
            owner_id: 1,
            stock_id: 2,
            quantity: 2.0,
            avg_price: 10.0,
        };
        let merged = accumulate(
            Some(existing),
            1,
            2,
            2.0,
            Execution {
                new_price: 12.0,
                exec_price: 11.0,
            },
        );
        assert_eq!(merged.quantity, 4.0);
        assert!((merged.avg_price - 10.5).abs() < 1e-12);
    }

    #[test]
    fn market_account_is_not_tradable() {
        let (engine, alice, _bob) = engine_with_accounts();
        let error = engine
            .execute_buy(alice.id, grub_ledger::MARKET_USERNAME, 1.0, 0.0)
            .expect_err("system account");
        assert!(matches!(error, TradeError::NotTradable { .. }));
    }

    #[test]
    fn tiny_share_counts_are_too_small() {
        let (engine, alice, _bob) = engine_with_accounts();
        let error = engine
            .execute_buy(alice.id, "BOB", 0.000_01, 0.0)
            .expect_err("rounds to zero");
        assert!(matches!(error, TradeError::AmountTooSmall));
    }

    #[test]
    fn accumulated_quantity_stays_on_the_share_grid() {
        let existing = HoldingRecord {
            owner_id: 1,
            stock_id: 2,
            quantity: 0.7,
            avg_price: 10.0,
        };
        let merged = accumulate(
            Some(existing),
            1,
            2,
            0.2,
            Execution {
                new_price: 10.0,
                exec_price: 10.0,
            },
        );
        assert_eq!(merged.quantity, 0.9);
    }
}
