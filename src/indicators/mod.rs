// Technical indicators module
// Implements RSI, EMA, MACD and fractal detection over a candle series

pub mod fractal;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use fractal::{bearish_fractal, bullish_fractal};
pub use macd::{calculate_macd, MacdPoint};
pub use moving_average::{calculate_ema, calculate_ema_series, ewm_mean};
pub use rsi::{calculate_rsi, calculate_rsi_series};

use crate::models::Candle;
use rust_decimal::prelude::ToPrimitive;

/// Close prices as f64 for indicator math
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| c.close.to_f64().unwrap_or(f64::NAN))
        .collect()
}

/// Value on the second-to-last element, i.e. the last closed candle
pub fn last_closed<T: Copy>(series: &[T]) -> Option<T> {
    series.len().checked_sub(2).map(|i| series[i])
}
