//! Periodic economy maintenance: price decay, dividends and market snapshots.

use std::sync::Arc;

use grub_ledger::{Ledger, LedgerError, MarketSnapshotRecord, PricePointRecord};
use serde::Serialize;
use tracing::{info, warn};

use crate::collaborators::{LogNotifier, Notification, Notifier};
use crate::config::MaintenanceConfig;
use crate::pricing::{round_cents, PricingModel};
use crate::retry::RetryConfig;
use crate::{AccountId, JobError, UtcDateTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecayReport {
    /// Stocks with no trade inside the inactivity window.
    pub candidates: usize,
    pub decayed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DividendReport {
    pub holders: usize,
    pub paid: usize,
    pub total_paid: f64,
    pub failed: usize,
}

/// Runs the decay, dividend and snapshot jobs against a ledger.
#[derive(Clone)]
pub struct Maintenance {
    ledger: Ledger,
    pricing: PricingModel,
    config: MaintenanceConfig,
    retry: RetryConfig,
    notifier: Arc<dyn Notifier>,
}

impl Maintenance {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            pricing: PricingModel::default(),
            config: MaintenanceConfig::default(),
            retry: RetryConfig::default(),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_config(mut self, config: MaintenanceConfig) -> Self {
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

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    pub fn run_daily_decay(&self) -> Result<DecayReport, JobError> {
        self.run_daily_decay_at(UtcDateTime::now())
    }

    /// Decay every stock not traded within the inactivity window before `now`.
    pub fn run_daily_decay_at(&self, now: UtcDateTime) -> Result<DecayReport, JobError> {
        let since_ms = now.minus(self.config.inactivity_window).unix_millis();
        let idle = self.ledger.read(|tx| tx.stocks_not_traded_since(since_ms))?;

        let mut report = DecayReport {
            candidates: idle.len(),
            ..DecayReport::default()
        };
        for stock in &idle {
            match self.decay_stock(stock.id, since_ms, now) {
                Ok(true) => report.decayed += 1,
                Ok(false) => {}
                Err(error) => {
                    report.failed += 1;
                    warn!(account_id = stock.id, ticker = %stock.ticker, %error, "decay failed");
                }
            }
        }

        info!(
            candidates = report.candidates,
            decayed = report.decayed,
            failed = report.failed,
            "daily decay applied"
        );
        Ok(report)
    }

    fn decay_stock(
        &self,
        stock_id: AccountId,
        since_ms: i64,
        now: UtcDateTime,
    ) -> Result<bool, LedgerError> {
        self.retry
            .run(
                || {
                    self.ledger.transact(|tx| {
                        let Some(stock) = tx.account_by_id(stock_id)? else {
                            return Ok(false);
                        };
                        // A trade may have landed since the candidates were listed.
                        let traded_recently = tx
                            .last_trade_ms(stock_id)?
                            .is_some_and(|last| last >= since_ms);
                        if traded_recently || !stock.is_tradable() {
                            return Ok(false);
                        }

                        let price = self.pricing.apply_decay(stock.current_price);
                        if price == stock.current_price {
                            return Ok(false);
                        }
                        tx.update_price(stock_id, stock.version, price)?;
                        tx.insert_price_point(&PricePointRecord {
                            stock_id,
                            price,
                            recorded_at_ms: now.unix_millis(),
                        })?;
                        Ok(true)
                    })
                },
                LedgerError::is_conflict,
            )
            .map_err(|error| error.into_inner())
    }

    /// Pay every holder a fraction of the current value of their holdings.
    pub fn run_dividends(&self) -> Result<DividendReport, JobError> {
        let holders = self.ledger.read(|tx| tx.holding_owners())?;

        let mut report = DividendReport {
            holders: holders.len(),
            ..DividendReport::default()
        };
        for owner in holders {
            match self.pay_dividend(owner) {
                Ok(Some(amount)) => {
                    report.paid += 1;
                    report.total_paid += amount;
                    let notification = Notification::Dividend {
                        recipient: owner,
                        amount,
                    };
                    if let Err(error) = self.notifier.notify(&notification) {
                        warn!(account_id = owner, %error, "dividend notification failed");
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    report.failed += 1;
                    warn!(account_id = owner, %error, "dividend payment failed");
                }
            }
        }

        info!(
            cadence = %self.config.dividend_cadence,
            holders = report.holders,
            paid = report.paid,
            total_paid = report.total_paid,
            "dividends paid"
        );
        Ok(report)
    }

    fn pay_dividend(&self, owner: AccountId) -> Result<Option<f64>, LedgerError> {
        self.retry
            .run(
                || {
                    self.ledger.transact(|tx| {
                        let value = tx.holdings_value(owner)?;
                        let raw = value * self.config.dividend_rate;
                        if raw <= self.config.min_dividend {
                            return Ok(None);
                        }
                        let dividend = round_cents(raw);
                        tx.adjust_balance(owner, dividend)?;
                        Ok(Some(dividend))
                    })
                },
                LedgerError::is_conflict,
            )
            .map_err(|error| error.into_inner())
    }

    pub fn record_market_snapshot(&self) -> Result<MarketSnapshotRecord, JobError> {
        self.record_market_snapshot_at(UtcDateTime::now())
    }

    /// Persist the current economy totals.
    pub fn record_market_snapshot_at(
        &self,
        now: UtcDateTime,
    ) -> Result<MarketSnapshotRecord, JobError> {
        let snapshot = self.ledger.transact(|tx| {
            let totals = tx.market_totals()?;
            let snapshot = MarketSnapshotRecord {
                total_market_cap: totals.market_cap,
                total_invested: totals.invested,
                total_cash: totals.cash,
                total_grub: totals.total_grub(),
                recorded_at_ms: now.unix_millis(),
            };
            tx.insert_market_snapshot(&snapshot)?;
            Ok::<_, LedgerError>(snapshot)
        })?;
        info!(
            market_cap = snapshot.total_market_cap,
            invested = snapshot.total_invested,
            cash = snapshot.total_cash,
            "market snapshot recorded"
        );
        Ok(snapshot)
    }
}
