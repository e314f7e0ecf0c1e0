use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BotError;

/// Tradable instrument as listed by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Minimum tradable quantity increment
    pub lot_size: Decimal,
}

/// A single public trade on the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp_ms: i64,
}

/// OHLCV candle keyed by the start of its interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Candle opened by a single trade
    pub fn from_trade(timestamp_ms: i64, price: Decimal, size: Decimal) -> Self {
        Self {
            timestamp_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
        }
    }

    /// Zero-volume candle carrying the previous close through an empty interval
    pub fn flat(timestamp_ms: i64, price: Decimal) -> Self {
        Self::from_trade(timestamp_ms, price, Decimal::ZERO)
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_default()
    }
}

/// Candle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    pub fn interval_ms(&self) -> i64 {
        let secs = match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
        };
        secs * 1000
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }
}

impl FromStr for Timeframe {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            other => Err(BotError::UnknownTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Numeric form: 1 long, -1 short, 0 none
    pub fn as_i8(&self) -> i8 {
        match self {
            Signal::Buy => 1,
            Signal::Sell => -1,
            Signal::Hold => 0,
        }
    }

    pub fn side(&self) -> Option<TradeSide> {
        match self {
            Signal::Buy => Some(TradeSide::Long),
            Signal::Sell => Some(TradeSide::Short),
            Signal::Hold => None,
        }
    }
}

/// Spot wallets cannot go short; futures accounts can
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    #[default]
    Spot,
    Futures,
}

/// Account balance for one asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Balance {
    Spot { free: Decimal, locked: Decimal },
    Futures { wallet_balance: Decimal },
}

impl Balance {
    /// Amount usable for sizing a new trade
    pub fn available(&self) -> Decimal {
        match self {
            Balance::Spot { free, .. } => *free,
            Balance::Futures { wallet_balance } => *wallet_balance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("Buy"),
            OrderSide::Sell => f.write_str("Sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
}

/// Public market-data streams a contract can be subscribed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TickChannel {
    AggTrade,
    BookTicker,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Pending,
    Filled,
    Rejected,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::Pending => f.write_str("pending"),
            OrderState::Filled => f.write_str("filled"),
            OrderState::Rejected => f.write_str("rejected"),
        }
    }
}

/// Exchange-side view of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: OrderState,
    pub avg_fill_price: Option<Decimal>,
    pub executed_qty: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            TradeSide::Long => OrderSide::Buy,
            TradeSide::Short => OrderSide::Sell,
        }
    }

    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            TradeSide::Long => OrderSide::Sell,
            TradeSide::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Long => f.write_str("Long"),
            TradeSide::Short => f.write_str("Short"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Entry order came back rejected after it was accepted
    EntryRejected,
}

/// One position opened by a strategy activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub opened_at_ms: i64,
    /// None until the entry order is confirmed filled
    pub entry_price: Option<Decimal>,
    pub symbol: String,
    pub strategy_name: String,
    pub side: TradeSide,
    pub status: TradeStatus,
    /// Unrealized while open, realized once closed
    pub pnl: Decimal,
    pub quantity: Decimal,
    pub entry_order_id: String,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub closed_at_ms: Option<i64>,
    pub exit_reason: Option<ExitReason>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Open and confirmed filled, so exit checks apply
    pub fn is_live(&self) -> bool {
        self.is_open() && self.entry_price.is_some()
    }

    /// Profit at `price` for the current quantity
    pub fn pnl_at(&self, price: Decimal) -> Option<Decimal> {
        let entry = self.entry_price?;
        let diff = match self.side {
            TradeSide::Long => price - entry,
            TradeSide::Short => entry - price,
        };
        Some(diff * self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade(side: TradeSide) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            opened_at_ms: 0,
            entry_price: Some(Decimal::from(100)),
            symbol: "BTCUSDT".to_string(),
            strategy_name: "Technical".to_string(),
            side,
            status: TradeStatus::Open,
            pnl: Decimal::ZERO,
            quantity: Decimal::from(2),
            entry_order_id: "1".to_string(),
            stop_loss: None,
            take_profit: None,
            exit_price: None,
            closed_at_ms: None,
            exit_reason: None,
        }
    }

    #[test]
    fn test_timeframe_intervals() {
        assert_eq!(Timeframe::M1.interval_ms(), 60_000);
        assert_eq!(Timeframe::H4.interval_ms(), 14_400_000);
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert!("2m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_serde_names() {
        let tf: Timeframe = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(tf, Timeframe::H1);
        assert_eq!(serde_json::to_string(&Timeframe::M5).unwrap(), "\"5m\"");
    }

    #[test]
    fn test_balance_available() {
        let spot = Balance::Spot {
            free: Decimal::from(50),
            locked: Decimal::from(10),
        };
        let futures = Balance::Futures {
            wallet_balance: Decimal::from(70),
        };
        assert_eq!(spot.available(), Decimal::from(50));
        assert_eq!(futures.available(), Decimal::from(70));
    }

    #[test]
    fn test_trade_pnl_by_side() {
        let long = sample_trade(TradeSide::Long);
        assert_eq!(long.pnl_at(Decimal::from(110)), Some(Decimal::from(20)));

        let short = sample_trade(TradeSide::Short);
        assert_eq!(short.pnl_at(Decimal::from(110)), Some(Decimal::from(-20)));
    }

    #[test]
    fn test_unfilled_trade_has_no_pnl() {
        let mut trade = sample_trade(TradeSide::Long);
        trade.entry_price = None;
        assert!(!trade.is_live());
        assert_eq!(trade.pnl_at(Decimal::from(110)), None);
    }

    #[test]
    fn test_signal_mapping() {
        assert_eq!(Signal::Buy.as_i8(), 1);
        assert_eq!(Signal::Sell.side(), Some(TradeSide::Short));
        assert_eq!(Signal::Hold.side(), None);
        assert_eq!(TradeSide::Long.exit_order_side(), OrderSide::Sell);
    }
}
