//! Price impact, slippage and decay.
//!
//! Everything here is pure: no I/O, no clock, no randomness.
//!
//! Rounding always works against the party that would otherwise profit from it.
//! A trade's stored post-impact price is rounded to cents *toward* the pre-trade
//! price, so a move never overshoots its raw target. The execution price is taken
//! from the unrounded target, and the caller rounds totals against the trader
//! (see [`round_cost`] and [`round_proceeds`]). Together these make buying and
//! immediately selling the same number of shares strictly unprofitable.

use serde::{Deserialize, Serialize};

use crate::Side;

/// Absorbs binary representation error when a value should land exactly on a cent.
const CENT_TOLERANCE: f64 = 1e-9;

/// Outcome of pricing a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Spot price after the trade, rounded to cents.
    pub new_price: f64,
    /// Per-share price charged or paid, including slippage.
    pub exec_price: f64,
}

/// Constants of the exchange's pricing curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingModel {
    /// Relative move produced by trading the whole float.
    pub volatility: f64,
    /// Price that decay pulls idle stocks toward.
    pub baseline_price: f64,
    /// Fraction of the price moved toward baseline per decay run.
    pub decay_rate: f64,
    /// Prices this close to baseline are left alone by decay.
    pub decay_epsilon: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Fraction of a buy's total credited to the stock's own account.
    pub appreciation_share: f64,
}

impl Default for PricingModel {
    fn default() -> Self {
        Self {
            volatility: 5.0,
            baseline_price: 10.0,
            decay_rate: 0.005,
            decay_epsilon: 0.01,
            min_price: 1.0,
            max_price: 1000.0,
            appreciation_share: 0.02,
        }
    }
}

impl PricingModel {
    /// Spot price after `signed_shares` (positive buys, negative sells) trade.
    ///
    /// Returns `current_price` unchanged when `shares_outstanding` is zero.
    pub fn compute_impact(
        &self,
        current_price: f64,
        signed_shares: f64,
        shares_outstanding: i64,
    ) -> f64 {
        if shares_outstanding == 0 {
            return current_price;
        }
        let raw = self.raw_target(current_price, signed_shares, shares_outstanding);
        self.settle(current_price, raw)
    }

    /// Spot price after the trade plus the execution price charged for it.
    ///
    /// The execution price is the mean of the pre-trade price and the unrounded
    /// post-impact target, bounded to the price range.
    pub fn compute_execution(
        &self,
        current_price: f64,
        signed_shares: f64,
        shares_outstanding: i64,
    ) -> Execution {
        if shares_outstanding == 0 {
            return Execution {
                new_price: current_price,
                exec_price: current_price,
            };
        }
        let raw = self.raw_target(current_price, signed_shares, shares_outstanding);
        Execution {
            new_price: self.settle(current_price, raw),
            exec_price: self.clamp((current_price + raw) / 2.0),
        }
    }

    /// Execution for `shares` traded on `side`.
    pub fn execution_for(
        &self,
        side: Side,
        current_price: f64,
        shares: f64,
        shares_outstanding: i64,
    ) -> Execution {
        let signed = match side {
            Side::Buy => shares,
            Side::Sell => -shares,
        };
        self.compute_execution(current_price, signed, shares_outstanding)
    }

    /// Apply one decay step toward the baseline price.
    pub fn apply_decay(&self, current_price: f64) -> f64 {
        let baseline = self.baseline_price;
        if (current_price - baseline).abs() < self.decay_epsilon {
            return current_price;
        }

        let decayed = if current_price > baseline {
            (current_price * (1.0 - self.decay_rate)).max(baseline)
        } else {
            (current_price * (1.0 + self.decay_rate)).min(baseline)
        };
        self.clamp(round_cents(decayed))
    }

    /// Ambient drift of `change_pct` (signed fraction) with no trade behind it.
    ///
    /// Routed through [`Self::compute_impact`] so drift obeys the same bounds and
    /// rounding as trades.
    pub fn drift(&self, current_price: f64, change_pct: f64, shares_outstanding: i64) -> f64 {
        if shares_outstanding == 0 || self.volatility == 0.0 {
            return current_price;
        }
        let equivalent_shares = change_pct * shares_outstanding as f64 / self.volatility;
        self.compute_impact(current_price, equivalent_shares, shares_outstanding)
    }

    /// Amount of a buy's total credited to the stock's own account.
    pub fn appreciation(&self, total: f64) -> f64 {
        round_cents(total * self.appreciation_share)
    }

    pub fn clamp(&self, price: f64) -> f64 {
        price.clamp(self.min_price, self.max_price)
    }

    fn raw_target(&self, current_price: f64, signed_shares: f64, shares_outstanding: i64) -> f64 {
        let fraction = signed_shares / shares_outstanding as f64;
        current_price * (1.0 + fraction * self.volatility)
    }

    /// Bound `raw` and round it to cents toward `current_price`.
    fn settle(&self, current_price: f64, raw: f64) -> f64 {
        let bounded = self.clamp(raw);
        let rounded = if bounded >= current_price {
            floor_cents(bounded)
        } else {
            ceil_cents(bounded)
        };
        self.clamp(rounded)
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn floor_cents(value: f64) -> f64 {
    (value * 100.0 + CENT_TOLERANCE).floor() / 100.0
}

pub fn ceil_cents(value: f64) -> f64 {
    (value * 100.0 - CENT_TOLERANCE).ceil() / 100.0
}

/// Round a share count to 4 decimal places.
pub fn round_shares(shares: f64) -> f64 {
    (shares * 10_000.0).round() / 10_000.0
}

/// Total a buyer pays for `shares` at `exec_price`, rounded up to the cent.
pub fn round_cost(shares: f64, exec_price: f64) -> f64 {
    ceil_cents(shares * exec_price)
}

/// Total a seller receives for `shares` at `exec_price`, rounded down to the cent.
pub fn round_proceeds(shares: f64, exec_price: f64) -> f64 {
    floor_cents(shares * exec_price)
}
