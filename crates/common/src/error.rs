use thiserror::Error;

use crate::RejectionReason;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Risk limit exceeded: {reason}")]
    RiskLimitExceeded { reason: RejectionReason },

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures a polling loop can skip past and retry next cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientData { .. }
                | Error::InvalidInput(_)
                | Error::RiskLimitExceeded { .. }
                | Error::Exchange(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
