// Tick ingestion, strategy activations and order handling
pub mod activation;
pub mod candle_series;
pub mod engine;
pub mod log_stream;
pub mod order_tracker;
pub mod performance;
pub mod position_manager;
pub mod price_feed;

pub use activation::{Activation, ActivationConfig, Phase};
pub use candle_series::{CandleEvent, CandleSeries};
pub use engine::{Engine, EngineSettings};
pub use log_stream::{LogEntry, LogStream};
pub use order_tracker::OrderTracker;
pub use performance::PerformanceSummary;
pub use position_manager::{PositionManager, SharedTradeBook, TradeBook};
pub use price_feed::{read_ticks_jsonl, SyntheticFeed};
