use rust_decimal::Decimal;

use super::{PercentExits, StrategyParams};
use crate::indicators::{calculate_macd, calculate_rsi_series, closes, last_closed};
use crate::models::{Candle, Signal};
use crate::Result;

/// RSI + MACD mean-reversion strategy
///
/// - Long when RSI < 30 and the MACD line is above its signal line
/// - Short when RSI > 70 and the MACD line is below its signal line
///
/// Indicators are read on the last closed candle, never the forming one.
#[derive(Debug, Clone)]
pub struct TechnicalStrategy {
    pub rsi_length: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_signal: usize,
    pub balance_pct: Decimal,
    pub exits: PercentExits,
}

impl TechnicalStrategy {
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            rsi_length: params.period("rsi_length")?,
            ema_fast: params.period("ema_fast")?,
            ema_slow: params.period("ema_slow")?,
            ema_signal: params.period("ema_signal")?,
            balance_pct: params.decimal("balance_pct")?,
            exits: PercentExits::from_params(params)?,
        })
    }

    pub fn evaluate_signal(&self, candles: &[Candle]) -> Signal {
        let prices = closes(candles);

        let rsi = match last_closed(&calculate_rsi_series(&prices, self.rsi_length)).flatten() {
            Some(rsi) => rsi,
            None => return Signal::Hold,
        };
        let macd = match last_closed(&calculate_macd(
            &prices,
            self.ema_fast,
            self.ema_slow,
            self.ema_signal,
        )) {
            Some(point) => point,
            None => return Signal::Hold,
        };

        tracing::debug!(
            rsi = rsi,
            macd_line = macd.line,
            macd_signal = macd.signal,
            "Technical indicators"
        );

        if rsi < 30.0 && macd.line > macd.signal {
            Signal::Buy
        } else if rsi > 70.0 && macd.line < macd.signal {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}
