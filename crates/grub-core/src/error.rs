use grub_ledger::LedgerError;
use thiserror::Error;

/// Construction-time validation errors for domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("timestamp {millis}ms is out of range")]
    TimestampOutOfRange { millis: i64 },

    #[error("specify either a share count or a grub amount")]
    MissingOrderSize,
    #[error("specify only one of a share count or a grub amount")]
    AmbiguousOrderSize,
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
}

/// Why a buy or sell was not executed.
///
/// Every variant leaves balances, holdings and prices exactly as they were.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("stock not found: {ticker}")]
    StockNotFound { ticker: String },
    #[error("{ticker} is not a tradable stock")]
    NotTradable { ticker: String },
    #[error("cannot buy your own stock")]
    SelfTrade,
    #[error(transparent)]
    InvalidOrderSize(#[from] ValidationError),
    #[error("amount too small to buy any shares")]
    AmountTooSmall,
    #[error("insufficient Grub balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },
    #[error("you don't own any shares of this stock")]
    NoShares,
    #[error("insufficient shares to sell: requested {requested}, held {held}")]
    InsufficientShares { requested: f64, held: f64 },
    #[error("balance not found for account {account_id}")]
    BalanceNotFound { account_id: i64 },

    #[error("trade abandoned after {attempts} conflicting attempts")]
    Contention { attempts: u32 },
    #[error(transparent)]
    Store(#[from] LedgerError),
}

impl TradeError {
    /// True for failures caused by the request itself rather than the system.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Contention { .. })
    }

    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_conflict())
    }
}

/// Failure of a background job as a whole.
///
/// Per-account failures never surface here; they are logged and counted.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] LedgerError),
    #[error("background task panicked or was cancelled: {0}")]
    Join(String),
}

/// Failure reported by a best-effort collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}
