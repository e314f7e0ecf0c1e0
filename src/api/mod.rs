// Exchange collaborator boundary
pub mod paper;

pub use paper::{FillMode, PaperExchange, PlacedOrder};

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::models::{
    Balance, Candle, Contract, MarketKind, OrderSide, OrderStatus, OrderType, TickChannel,
    Timeframe,
};
use crate::Result;

/// What the trading core needs from an exchange connector
///
/// Wire details (REST/WebSocket, signing, rate limits) live behind this trait.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Display name used in log messages
    fn name(&self) -> &str;

    /// Spot wallets cannot short and size from `free`; futures size from `wallet_balance`
    fn market_kind(&self) -> MarketKind;

    /// Contract metadata for a symbol, if listed
    fn contract(&self, symbol: &str) -> Option<Contract>;

    /// Recent candles, oldest first; the last one may still be forming
    async fn get_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>>;

    async fn get_balances(&self) -> Result<HashMap<String, Balance>>;

    async fn place_order(
        &self,
        contract: &Contract,
        order_type: OrderType,
        quantity: Decimal,
        side: OrderSide,
    ) -> Result<OrderStatus>;

    /// `None` when the exchange does not (yet) know the order
    async fn get_order_status(
        &self,
        contract: &Contract,
        order_id: &str,
    ) -> Result<Option<OrderStatus>>;

    async fn subscribe_ticks(&self, contract: &Contract, channels: &[TickChannel]) -> Result<()>;
}
