// Trading strategy module
pub mod breakout;
pub mod dummy;
pub mod fractal;
pub mod sizing;
pub mod technical;

pub use breakout::BreakoutStrategy;
pub use dummy::DummyStrategy;
pub use fractal::FractalStrategy;
pub use technical::TechnicalStrategy;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::BotError;
use crate::models::{Candle, ExitReason, Signal, Trade, TradeSide};
use crate::Result;

/// Which strategy an activation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyVariant {
    Technical,
    Breakout,
    #[serde(alias = "fractals")]
    Fractal,
    Dummy,
}

impl fmt::Display for StrategyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyVariant::Technical => "Technical",
            StrategyVariant::Breakout => "Breakout",
            StrategyVariant::Fractal => "Fractals",
            StrategyVariant::Dummy => "Dummy",
        };
        f.write_str(name)
    }
}

/// Raw `name -> number` parameters as entered by the operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyParams(HashMap<String, f64>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    fn raw(&self, name: &str) -> Result<f64> {
        let value = self
            .0
            .get(name)
            .copied()
            .ok_or_else(|| BotError::MissingParameter(name.to_string()))?;

        if !value.is_finite() {
            return Err(BotError::InvalidParameter {
                name: name.to_string(),
                reason: "not a finite number".to_string(),
            });
        }
        Ok(value)
    }

    /// Required decimal parameter
    pub fn decimal(&self, name: &str) -> Result<Decimal> {
        let value = self.raw(name)?;
        to_decimal(name, value)
    }

    /// Decimal parameter with a default when absent
    pub fn decimal_or(&self, name: &str, default: Decimal) -> Result<Decimal> {
        match self.0.get(name) {
            Some(_) => self.decimal(name),
            None => Ok(default),
        }
    }

    /// Required indicator length, a positive integer
    pub fn period(&self, name: &str) -> Result<usize> {
        let value = self.raw(name)?;
        if value < 1.0 || value.fract() != 0.0 {
            return Err(BotError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected a positive whole number, got {}", value),
            });
        }
        Ok(value as usize)
    }
}

impl From<HashMap<String, f64>> for StrategyParams {
    fn from(map: HashMap<String, f64>) -> Self {
        Self(map)
    }
}

fn to_decimal(name: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| BotError::InvalidParameter {
        name: name.to_string(),
        reason: format!("{} is out of range", value),
    })
}

/// Stop-loss and take-profit recorded on a trade at entry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntryLevels {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Fixed percentage stop/target around a reference price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentExits {
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

impl PercentExits {
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            stop_loss_pct: params.decimal_or("stop_loss_pct", Decimal::ONE)?,
            take_profit_pct: params.decimal_or("take_profit_pct", Decimal::TWO)?,
        })
    }

    fn stop_at(&self, side: TradeSide, reference: Decimal) -> Decimal {
        let offset = self.stop_loss_pct / Decimal::ONE_HUNDRED;
        match side {
            TradeSide::Long => reference * (Decimal::ONE - offset),
            TradeSide::Short => reference * (Decimal::ONE + offset),
        }
    }

    fn target_at(&self, side: TradeSide, reference: Decimal) -> Decimal {
        let offset = self.take_profit_pct / Decimal::ONE_HUNDRED;
        match side {
            TradeSide::Long => reference * (Decimal::ONE + offset),
            TradeSide::Short => reference * (Decimal::ONE - offset),
        }
    }

    pub fn levels(&self, side: TradeSide, price: Decimal) -> EntryLevels {
        EntryLevels {
            stop_loss: Some(self.stop_at(side, price)),
            take_profit: Some(self.target_at(side, price)),
        }
    }

    /// Stop takes precedence when both would trigger
    pub fn check(&self, trade: &Trade, price: Decimal) -> Option<ExitReason> {
        let entry = trade.entry_price?;
        let stop = self.stop_at(trade.side, entry);
        let target = self.target_at(trade.side, entry);

        match trade.side {
            TradeSide::Long if price <= stop => Some(ExitReason::StopLoss),
            TradeSide::Long if price >= target => Some(ExitReason::TakeProfit),
            TradeSide::Short if price >= stop => Some(ExitReason::StopLoss),
            TradeSide::Short if price <= target => Some(ExitReason::TakeProfit),
            _ => None,
        }
    }
}

/// One of the interchangeable strategy variants
///
/// Every activation holds exactly one of these and drives it through the same
/// lifecycle: `observe` on each closed candle while flat, `evaluate_signal` to
/// decide an entry, `size_trade` / `entry_levels` to build the order, and
/// `exit_check` on every tick while a filled trade is open.
#[derive(Debug, Clone)]
pub enum StrategyKind {
    Technical(TechnicalStrategy),
    Breakout(BreakoutStrategy),
    Fractal(FractalStrategy),
    Dummy(DummyStrategy),
}

impl StrategyKind {
    /// Build a variant, refusing when a required parameter is missing
    pub fn from_params(variant: StrategyVariant, params: &StrategyParams) -> Result<Self> {
        Ok(match variant {
            StrategyVariant::Technical => {
                StrategyKind::Technical(TechnicalStrategy::from_params(params)?)
            }
            StrategyVariant::Breakout => {
                StrategyKind::Breakout(BreakoutStrategy::from_params(params)?)
            }
            StrategyVariant::Fractal => StrategyKind::Fractal(FractalStrategy::from_params(params)?),
            StrategyVariant::Dummy => StrategyKind::Dummy(DummyStrategy::from_params(params)?),
        })
    }

    pub fn variant(&self) -> StrategyVariant {
        match self {
            StrategyKind::Technical(_) => StrategyVariant::Technical,
            StrategyKind::Breakout(_) => StrategyVariant::Breakout,
            StrategyKind::Fractal(_) => StrategyVariant::Fractal,
            StrategyKind::Dummy(_) => StrategyVariant::Dummy,
        }
    }

    /// Name recorded on trades
    pub fn name(&self) -> String {
        self.variant().to_string()
    }

    /// Update stateful bookkeeping after a candle closes while flat
    pub fn observe(&mut self, candles: &[Candle]) {
        if let StrategyKind::Fractal(strategy) = self {
            strategy.record_fractals(candles);
        }
    }

    pub fn evaluate_signal(&self, candles: &[Candle]) -> Signal {
        match self {
            StrategyKind::Technical(s) => s.evaluate_signal(candles),
            StrategyKind::Breakout(s) => s.evaluate_signal(candles),
            StrategyKind::Fractal(s) => s.evaluate_signal(candles),
            StrategyKind::Dummy(s) => s.evaluate_signal(candles),
        }
    }

    /// Quantity to trade given the available quote balance
    pub fn size_trade(
        &self,
        side: TradeSide,
        price: Decimal,
        balance: Decimal,
        lot_size: Decimal,
    ) -> Result<Decimal> {
        match self {
            StrategyKind::Technical(s) => {
                sizing::balance_pct_size(balance, s.balance_pct, price, lot_size)
            }
            StrategyKind::Breakout(s) => {
                sizing::balance_pct_size(balance, s.balance_pct, price, lot_size)
            }
            StrategyKind::Dummy(s) => {
                sizing::balance_pct_size(balance, s.balance_pct, price, lot_size)
            }
            StrategyKind::Fractal(s) => {
                let stop = s.stop_for(side).ok_or_else(|| {
                    BotError::SizingUnavailable(format!("no {} fractal stop yet", side))
                })?;
                sizing::risk_size(balance, s.risk_pct, price, stop, lot_size)
            }
        }
    }

    pub fn entry_levels(&self, side: TradeSide, price: Decimal) -> EntryLevels {
        match self {
            StrategyKind::Technical(s) => s.exits.levels(side, price),
            StrategyKind::Breakout(s) => s.exits.levels(side, price),
            StrategyKind::Fractal(s) => s.entry_levels(side, price),
            StrategyKind::Dummy(_) => EntryLevels::default(),
        }
    }

    /// Whether an open, filled trade should be exited at `price`
    pub fn exit_check(&self, trade: &Trade, price: Decimal) -> Option<ExitReason> {
        if !trade.is_live() {
            return None;
        }

        match self {
            StrategyKind::Technical(s) => s.exits.check(trade, price),
            StrategyKind::Breakout(s) => s.exits.check(trade, price),
            StrategyKind::Fractal(s) => s.exit_check(trade, price),
            StrategyKind::Dummy(_) => None,
        }
    }
}
