use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Requested size of a buy or sell, before it is resolved into a share count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSize {
    /// A fixed number of shares.
    Shares(f64),
    /// A Grub amount to spend (buy) or raise (sell) at the execution price.
    Amount(f64),
}

impl OrderSize {
    pub fn shares(count: f64) -> Result<Self, ValidationError> {
        positive_finite("shares", count).map(Self::Shares)
    }

    pub fn amount(grub: f64) -> Result<Self, ValidationError> {
        positive_finite("grub_amount", grub).map(Self::Amount)
    }

    /// Build an order from the two request fields, where zero means "unset".
    ///
    /// Exactly one of the two must be set, and it must be positive and finite.
    pub fn from_request(shares: f64, grub_amount: f64) -> Result<Self, ValidationError> {
        match (is_set(shares), is_set(grub_amount)) {
            (true, true) => Err(ValidationError::AmbiguousOrderSize),
            (true, false) => Self::shares(shares),
            (false, true) => Self::amount(grub_amount),
            (false, false) => Err(ValidationError::MissingOrderSize),
        }
    }
}

fn is_set(value: f64) -> bool {
    value != 0.0
}

fn positive_finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(value)
}
