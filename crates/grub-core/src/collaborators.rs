//! Seams to the systems around the exchange core.
//!
//! Notifications, sentiment and username lookups are best-effort: callers log
//! their failures at `warn` and carry on.

use std::collections::HashMap;

use grub_ledger::Ledger;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AccountId, CollaboratorError, Ticker};

/// Event delivered to an account owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Someone bought shares of the recipient's stock.
    TradeBuy {
        recipient: AccountId,
        actor_username: String,
        ticker: Ticker,
        shares: f64,
    },
    /// Someone sold shares of the recipient's stock.
    TradeSell {
        recipient: AccountId,
        actor_username: String,
        ticker: Ticker,
        shares: f64,
    },
    Dividend { recipient: AccountId, amount: f64 },
}

impl Notification {
    pub fn recipient(&self) -> AccountId {
        match self {
            Self::TradeBuy { recipient, .. }
            | Self::TradeSell { recipient, .. }
            | Self::Dividend { recipient, .. } => *recipient,
        }
    }

    /// Human-readable text shown to the recipient.
    pub fn message(&self) -> String {
        match self {
            Self::TradeBuy {
                actor_username,
                shares,
                ..
            } => format!("{actor_username} just bought {shares:.2} shares of you!"),
            Self::TradeSell {
                actor_username,
                shares,
                ..
            } => format!("{actor_username} just sold {shares:.2} shares of you"),
            Self::Dividend { amount, .. } => {
                format!("You received {amount:.2} Grub in dividends from your holdings!")
            }
        }
    }
}

/// Receives trade and dividend events.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;

    /// Hook run after every executed trade, e.g. to re-evaluate achievements.
    fn after_trade(&self, _actor: AccountId) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Notifier that only writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        info!(
            recipient = notification.recipient(),
            message = %notification.message(),
            "notification"
        );
        Ok(())
    }
}

/// Per-stock net social sentiment (likes minus dislikes).
pub trait SentimentSource: Send + Sync {
    /// Net score per stock; stocks without data are absent and count as zero.
    fn net_sentiment(&self) -> Result<HashMap<AccountId, i64>, CollaboratorError>;
}

/// Sentiment source with no data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSentiment;

impl SentimentSource for NoSentiment {
    fn net_sentiment(&self) -> Result<HashMap<AccountId, i64>, CollaboratorError> {
        Ok(HashMap::new())
    }
}

/// Fixed sentiment scores.
#[derive(Debug, Clone, Default)]
pub struct StaticSentiment {
    scores: HashMap<AccountId, i64>,
}

impl StaticSentiment {
    pub fn new(scores: HashMap<AccountId, i64>) -> Self {
        Self { scores }
    }

    pub fn with_score(mut self, stock: AccountId, score: i64) -> Self {
        self.scores.insert(stock, score);
        self
    }
}

impl SentimentSource for StaticSentiment {
    fn net_sentiment(&self) -> Result<HashMap<AccountId, i64>, CollaboratorError> {
        Ok(self.scores.clone())
    }
}

/// Resolves display names for accounts.
pub trait AccountDirectory: Send + Sync {
    fn username(&self, account: AccountId) -> Result<Option<String>, CollaboratorError>;
}

impl AccountDirectory for Ledger {
    fn username(&self, account: AccountId) -> Result<Option<String>, CollaboratorError> {
        self.account_by_id(account)
            .map(|record| record.map(|record| record.username))
            .map_err(|error| CollaboratorError::new("account directory", error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_messages_name_the_actor_and_share_count() {
        let ticker = Ticker::parse("BOB").expect("ticker");
        let buy = Notification::TradeBuy {
            recipient: 2,
            actor_username: "alice".to_string(),
            ticker,
            shares: 5.0,
        };

        assert_eq!(buy.recipient(), 2);
        assert_eq!(buy.message(), "alice just bought 5.00 shares of you!");
    }

    #[test]
    fn dividend_message_formats_amount_in_cents() {
        let dividend = Notification::Dividend {
            recipient: 3,
            amount: 10.0,
        };
        assert_eq!(
            dividend.message(),
            "You received 10.00 Grub in dividends from your holdings!"
        );
    }

    #[test]
    fn static_sentiment_returns_configured_scores() {
        let source = StaticSentiment::default().with_score(4, -3);
        let scores = source.net_sentiment().expect("scores");
        assert_eq!(scores.get(&4), Some(&-3));
        assert!(NoSentiment.net_sentiment().expect("empty").is_empty());
    }
}
