use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::api::{FillMode, PaperExchange};
use crate::execution::{ActivationConfig, EngineSettings};
use crate::models::{Contract, MarketKind};
use crate::Result;

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "candlebot";

/// Prefix of environment overrides, e.g. `CANDLEBOT__MAX_CANDLES=1000`
pub const ENV_PREFIX: &str = "CANDLEBOT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// tracing-subscriber filter, overridden by RUST_LOG
    pub log_filter: String,
    pub order_poll_interval_ms: u64,
    pub stale_tick_threshold_ms: i64,
    pub max_candles: usize,
    pub tick_channel_capacity: usize,
    pub paper: PaperSettings,
    pub activations: Vec<ActivationConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "candlebot=info".to_string(),
            order_poll_interval_ms: 2_000,
            stale_tick_threshold_ms: 2_000,
            max_candles: 5_000,
            tick_channel_capacity: 1_024,
            paper: PaperSettings::default(),
            activations: Vec::new(),
        }
    }
}

/// Starting balance of one asset
///
/// Kept as a list: config keys are case-folded, asset names are not.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub amount: Decimal,
}

/// The in-memory exchange the binary trades against
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub market: MarketKind,
    pub balances: Vec<AssetBalance>,
    pub contracts: Vec<Contract>,
    pub fill_mode: FillMode,
    /// First price of the synthetic feed
    pub start_price: Decimal,
    /// Candles of synthetic history served per activation
    pub history_candles: usize,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            market: MarketKind::Spot,
            balances: vec![AssetBalance {
                asset: "USDT".to_string(),
                amount: Decimal::from(10_000),
            }],
            contracts: vec![Contract {
                symbol: "BTCUSDT".to_string(),
                base_asset: "BTC".to_string(),
                quote_asset: "USDT".to_string(),
                lot_size: Decimal::new(1, 5),
            }],
            fill_mode: FillMode::Immediate,
            start_price: Decimal::from(30_000),
            history_candles: 200,
        }
    }
}

impl PaperSettings {
    /// Paper exchange with the configured contracts, balances and fill mode
    pub fn build_exchange(&self) -> PaperExchange {
        let exchange = self
            .contracts
            .iter()
            .cloned()
            .fold(PaperExchange::new(self.market), |ex, c| ex.with_contract(c));
        for balance in &self.balances {
            exchange.set_balance(&balance.asset, balance.amount);
        }
        exchange.set_fill_mode(self.fill_mode);
        exchange
    }
}

impl Settings {
    /// Defaults, then the TOML file, then `CANDLEBOT__*` environment variables
    ///
    /// An explicit `path` must exist; the default `candlebot.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn engine(&self) -> EngineSettings {
        EngineSettings {
            order_poll_interval: Duration::from_millis(self.order_poll_interval_ms),
            stale_tick_threshold_ms: self.stale_tick_threshold_ms,
            max_candles: self.max_candles,
            tick_channel_capacity: self.tick_channel_capacity,
        }
    }
}
