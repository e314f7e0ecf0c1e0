use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the trading core
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Missing {0} parameter")]
    MissingParameter(String),

    #[error("Invalid {name} parameter: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("No historical data retrieved for {0}")]
    NoHistoricalData(String),

    /// Quote-asset balance could not be resolved; the signal is skipped
    #[error("Trade size unavailable: {0}")]
    SizingUnavailable(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Unknown contract {0}")]
    UnknownContract(String),

    #[error("Unknown timeframe {0}")]
    UnknownTimeframe(String),

    #[error("Activation {0} not found")]
    ActivationNotFound(Uuid),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BotError {
    /// Sizing misses are routine and only worth a debug line
    pub fn is_sizing_unavailable(&self) -> bool {
        matches!(self, BotError::SizingUnavailable(_))
    }
}
