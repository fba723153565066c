use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] grub_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Trade(#[from] grub_core::TradeError),

    #[error(transparent)]
    Ledger(#[from] grub_ledger::LedgerError),

    #[error(transparent)]
    Job(#[from] grub_core::JobError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Trade(error) if error.is_validation() => 3,
            Self::Trade(_) => 4,
            Self::Ledger(_) => 4,
            Self::Job(_) => 4,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grub_core::TradeError;

    #[test]
    fn rejected_trades_exit_with_three() {
        let error = CliError::from(TradeError::SelfTrade);
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn contention_is_an_operational_failure() {
        let error = CliError::from(TradeError::Contention { attempts: 6 });
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn bad_arguments_exit_with_two() {
        let error = CliError::Command(String::from("shares must be positive"));
        assert_eq!(error.exit_code(), 2);
    }
}
