// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::{ExchangeClient, FillMode, PaperExchange};
pub use error::BotError;
pub use execution::{ActivationConfig, Engine, EngineSettings};
pub use models::*;
pub use strategy::{StrategyKind, StrategyParams, StrategyVariant};

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
