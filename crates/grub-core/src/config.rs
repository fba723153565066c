//! Tunables of the background processes.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings of the market maker's biased random walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Wait before the first tick after start-up.
    pub startup_delay: Duration,
    /// Smallest drift magnitude per tick, as a fraction of price.
    pub min_change: f64,
    /// Width of the drift magnitude range above `min_change`.
    pub change_spread: f64,
    pub buy_probability: f64,
    /// Buy-probability shift per point of net sentiment.
    pub sentiment_step: f64,
    pub min_buy_probability: f64,
    pub max_buy_probability: f64,
    /// Above this price, drift is forced down with `reversion_probability`.
    pub reversion_upper: f64,
    /// Below this price, drift is forced up with `reversion_probability`.
    pub reversion_lower: f64,
    pub reversion_probability: f64,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            interval: MINUTE,
            startup_delay: Duration::from_secs(3),
            min_change: 0.001,
            change_spread: 0.01,
            buy_probability: 0.65,
            sentiment_step: 0.02,
            min_buy_probability: 0.20,
            max_buy_probability: 0.90,
            reversion_upper: 15.0,
            reversion_lower: 7.0,
            reversion_probability: 0.35,
        }
    }
}

impl MarketMakerConfig {
    /// Buy probability for a stock with `net_sentiment`.
    pub fn buy_probability_for(&self, net_sentiment: i64) -> f64 {
        if net_sentiment == 0 {
            return self.buy_probability;
        }
        (self.buy_probability + net_sentiment as f64 * self.sentiment_step)
            .clamp(self.min_buy_probability, self.max_buy_probability)
    }
}

/// How often dividends are paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DividendCadence {
    Daily,
    Biweekly,
}

impl DividendCadence {
    pub fn period(self) -> Duration {
        match self {
            Self::Daily => DAY,
            Self::Biweekly => DAY * 14,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Biweekly => "biweekly",
        }
    }
}

impl Display for DividendCadence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DividendCadence {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "biweekly" => Ok(Self::Biweekly),
            other => Err(format!(
                "invalid dividend cadence '{other}', expected one of daily, biweekly"
            )),
        }
    }
}

/// Settings of decay, dividend and snapshot jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub decay_interval: Duration,
    /// Stocks traded within this window are not decayed.
    pub inactivity_window: Duration,
    pub dividend_cadence: DividendCadence,
    /// Fraction of holdings value paid per dividend run.
    pub dividend_rate: f64,
    /// Payouts whose unrounded amount is at or below this are skipped.
    pub min_dividend: f64,
    pub snapshot_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            decay_interval: DAY,
            inactivity_window: DAY,
            dividend_cadence: DividendCadence::Daily,
            dividend_rate: 0.01,
            min_dividend: 0.01,
            snapshot_interval: MINUTE * 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_shifts_buy_probability_within_bounds() {
        let config = MarketMakerConfig::default();
        assert_eq!(config.buy_probability_for(0), 0.65);
        assert!((config.buy_probability_for(5) - 0.75).abs() < 1e-12);
        assert_eq!(config.buy_probability_for(100), 0.90);
        assert_eq!(config.buy_probability_for(-100), 0.20);
    }

    #[test]
    fn parses_dividend_cadence() {
        assert_eq!("Daily".parse::<DividendCadence>(), Ok(DividendCadence::Daily));
        assert_eq!(
            "biweekly".parse::<DividendCadence>().map(DividendCadence::period),
            Ok(Duration::from_secs(14 * 24 * 60 * 60))
        );
        assert!("monthly".parse::<DividendCadence>().is_err());
    }
}
