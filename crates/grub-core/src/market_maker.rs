//! Background price drift.
//!
//! Each tick nudges every tradable stock by a small random percentage. The
//! direction is biased bullish, shifted by social sentiment, and pulled back
//! toward the baseline when a price strays too far. Drift is not a trade: it
//! writes a new price and a price point, nothing else.
//!
//! Every stock is updated in its own ledger transaction, so one failing account
//! never blocks the rest of the tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use grub_ledger::{
    AccountRecord, Ledger, LedgerError, PortfolioSnapshotRecord, PricePointRecord,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::collaborators::{NoSentiment, SentimentSource};
use crate::config::MarketMakerConfig;
use crate::pricing::{round_cents, PricingModel};
use crate::retry::RetryConfig;
use crate::scheduler::{run_blocking, wait_for_shutdown};
use crate::{AccountId, JobError, UtcDateTime};

/// Outcome of one market maker tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tradable accounts visited.
    pub examined: usize,
    /// Accounts whose price changed.
    pub moved: usize,
    pub failed: usize,
    pub snapshots: usize,
    pub snapshot_failures: usize,
}

/// Drives ambient price drift and portfolio snapshots.
#[derive(Clone)]
pub struct MarketMaker {
    ledger: Ledger,
    pricing: PricingModel,
    config: MarketMakerConfig,
    retry: RetryConfig,
    sentiment: Arc<dyn SentimentSource>,
    rng: Arc<Mutex<fastrand::Rng>>,
}

impl MarketMaker {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            pricing: PricingModel::default(),
            config: MarketMakerConfig::default(),
            retry: RetryConfig::default(),
            sentiment: Arc::new(NoSentiment),
            rng: Arc::new(Mutex::new(fastrand::Rng::new())),
        }
    }

    pub fn with_config(mut self, config: MarketMakerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingModel) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentSource>) -> Self {
        self.sentiment = sentiment;
        self
    }

    /// Make the random walk reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn config(&self) -> &MarketMakerConfig {
        &self.config
    }

    pub fn tick(&self) -> Result<TickReport, JobError> {
        self.tick_at(UtcDateTime::now())
    }

    /// Drift every tradable stock once, then snapshot every portfolio.
    ///
    /// Fails only if the account list itself cannot be read.
    pub fn tick_at(&self, now: UtcDateTime) -> Result<TickReport, JobError> {
        let accounts = self.ledger.read(|tx| tx.accounts())?;
        let sentiment = match self.sentiment.net_sentiment() {
            Ok(scores) => scores,
            Err(error) => {
                warn!(%error, "sentiment unavailable, drifting without it");
                HashMap::new()
            }
        };

        let mut report = TickReport::default();
        for account in accounts.iter().filter(|account| account.is_tradable()) {
            report.examined += 1;
            let net = sentiment.get(&account.id).copied().unwrap_or(0);
            match self.drift_account(account.id, net, now) {
                Ok(Some(price)) => {
                    report.moved += 1;
                    debug!(account_id = account.id, ticker = %account.ticker, price, "price drifted");
                }
                Ok(None) => {}
                Err(error) => {
                    report.failed += 1;
                    warn!(account_id = account.id, ticker = %account.ticker, %error, "drift failed");
                }
            }
        }

        let (snapshots, snapshot_failures) = self.snapshot_accounts(&accounts, now);
        report.snapshots = snapshots;
        report.snapshot_failures = snapshot_failures;
        Ok(report)
    }

    /// Record a portfolio snapshot for every tradable account.
    ///
    /// Returns the number recorded; failures are logged and skipped.
    pub fn snapshot_portfolios(&self, now: UtcDateTime) -> Result<usize, JobError> {
        let accounts = self.ledger.read(|tx| tx.accounts())?;
        Ok(self.snapshot_accounts(&accounts, now).0)
    }

    fn snapshot_accounts(&self, accounts: &[AccountRecord], now: UtcDateTime) -> (usize, usize) {
        let mut recorded = 0;
        let mut failed = 0;
        for account in accounts.iter().filter(|account| account.is_tradable()) {
            match self.snapshot_account(account.id, now) {
                Ok(()) => recorded += 1,
                Err(error) => {
                    failed += 1;
                    warn!(account_id = account.id, %error, "portfolio snapshot failed");
                }
            }
        }
        (recorded, failed)
    }

    fn snapshot_account(&self, account_id: AccountId, now: UtcDateTime) -> Result<(), LedgerError> {
        self.ledger.transact(|tx| {
            let wealth = tx
                .account_wealth(account_id)?
                .ok_or_else(|| LedgerError::NotFound {
                    entity: "balance",
                    key: account_id.to_string(),
                })?;
            tx.insert_portfolio_snapshot(&PortfolioSnapshotRecord {
                account_id,
                total_value: round_cents(wealth.total_value),
                cash: wealth.cash,
                recorded_at_ms: now.unix_millis(),
            })
        })
    }

    /// Apply one random drift to a stock. Returns the new price if it changed.
    fn drift_account(
        &self,
        account_id: AccountId,
        net_sentiment: i64,
        now: UtcDateTime,
    ) -> Result<Option<f64>, LedgerError> {
        self.retry
            .run(
                || {
                    self.ledger.transact(|tx| {
                        let Some(account) = tx.account_by_id(account_id)? else {
                            return Ok(None);
                        };
                        if !account.is_tradable() {
                            return Ok(None);
                        }

                        let change = self.draw_change(account.current_price, net_sentiment);
                        let price = self.pricing.drift(
                            account.current_price,
                            change,
                            account.shares_outstanding,
                        );
                        if price == account.current_price {
                            return Ok(None);
                        }

                        tx.update_price(account_id, account.version, price)?;
                        tx.insert_price_point(&PricePointRecord {
                            stock_id: account_id,
                            price,
                            recorded_at_ms: now.unix_millis(),
                        })?;
                        Ok(Some(price))
                    })
                },
                LedgerError::is_conflict,
            )
            .map_err(|error| error.into_inner())
    }

    /// Signed drift for one stock, as a fraction of its price.
    fn draw_change(&self, price: f64, net_sentiment: i64) -> f64 {
        let config = &self.config;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        let magnitude = config.min_change + rng.f64() * config.change_spread;
        let buy = rng.f64() < config.buy_probability_for(net_sentiment);
        let mut change = if buy { magnitude } else { -magnitude };

        if price > config.reversion_upper && rng.f64() < config.reversion_probability {
            change = -change.abs();
        } else if price < config.reversion_lower && rng.f64() < config.reversion_probability {
            change = change.abs();
        }
        change
    }

    /// Tick forever at the configured interval, after the start-up delay.
    pub async fn run(self) {
        let (_keep_alive, shutdown) = watch::channel(false);
        self.run_until(shutdown).await;
    }

    /// Tick every `config.interval` until `shutdown` flips to `true` or its sender drops.
    ///
    /// Shutdown is only observed between ticks; a tick in progress always
    /// finishes its current account transaction. A zero interval never ticks.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.interval;
        if interval.is_zero() {
            warn!("market maker interval is zero; not starting");
            return;
        }
        info!(interval_ms = interval.as_millis() as u64, "market maker started");
        tokio::select! {
            () = tokio::time::sleep(self.config.startup_delay) => {}
            () = wait_for_shutdown(&mut shutdown) => return,
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = wait_for_shutdown(&mut shutdown) => break,
            }

            let maker = self.clone();
            match run_blocking(move || maker.tick()).await {
                Ok(report) => info!(
                    examined = report.examined,
                    moved = report.moved,
                    failed = report.failed,
                    snapshots = report.snapshots,
                    "market maker tick"
                ),
                Err(error) => warn!(%error, "market maker tick failed"),
            }
        }
        info!("market maker stopped");
    }
}
