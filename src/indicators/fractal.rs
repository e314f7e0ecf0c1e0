use crate::models::Candle;
use rust_decimal::Decimal;

/// Stop offset applied beyond the fractal extreme (0.02%)
fn stop_buffer() -> Decimal {
    Decimal::new(2, 4)
}

/// Bearish fractal: the candle at -2 has a higher high than the candles at
/// -1, -3 and -4. Returns the short stop just above that high.
pub fn bearish_fractal(candles: &[Candle]) -> Option<Decimal> {
    let n = candles.len();
    if n < 4 {
        return None;
    }

    let pivot = candles[n - 2].high;
    let is_fractal = pivot > candles[n - 4].high
        && pivot > candles[n - 3].high
        && pivot > candles[n - 1].high;

    is_fractal.then(|| pivot * (Decimal::ONE + stop_buffer()))
}

/// Bullish fractal: the candle at -2 has a lower low than the candles at
/// -1, -3 and -4. Returns the long stop just below that low.
pub fn bullish_fractal(candles: &[Candle]) -> Option<Decimal> {
    let n = candles.len();
    if n < 4 {
        return None;
    }

    let pivot = candles[n - 2].low;
    let is_fractal = pivot < candles[n - 4].low
        && pivot < candles[n - 3].low
        && pivot < candles[n - 1].low;

    is_fractal.then(|| pivot * (Decimal::ONE - stop_buffer()))
}
