use rust_decimal::Decimal;

use super::{PercentExits, StrategyParams};
use crate::models::{Candle, Signal};
use crate::Result;

/// Range breakout with a volume filter
///
/// Compares the forming candle against the previous one: a close above the
/// previous high goes long, a close below the previous low goes short, in
/// both cases only when the forming candle already traded `min_volume`.
#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    pub min_volume: Decimal,
    pub balance_pct: Decimal,
    pub exits: PercentExits,
}

impl BreakoutStrategy {
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            min_volume: params.decimal("min_volume")?,
            balance_pct: params.decimal("balance_pct")?,
            exits: PercentExits::from_params(params)?,
        })
    }

    pub fn evaluate_signal(&self, candles: &[Candle]) -> Signal {
        let n = candles.len();
        if n < 2 {
            return Signal::Hold;
        }

        let current = &candles[n - 1];
        let previous = &candles[n - 2];

        if current.volume <= self.min_volume {
            return Signal::Hold;
        }

        if current.close > previous.high {
            Signal::Buy
        } else if current.close < previous.low {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}
