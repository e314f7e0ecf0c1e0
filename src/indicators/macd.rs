use super::moving_average::{calculate_ema_series, ewm_mean};

/// MACD line and its signal line at one candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: f64,
}

/// MACD series aligned with `prices`
///
/// line = EMA(fast) - EMA(slow), signal = EMA(line, signal_span)
pub fn calculate_macd(
    prices: &[f64],
    fast_span: usize,
    slow_span: usize,
    signal_span: usize,
) -> Vec<MacdPoint> {
    if signal_span == 0 {
        return Vec::new();
    }

    let fast = calculate_ema_series(prices, fast_span);
    let slow = calculate_ema_series(prices, slow_span);
    let line: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();
    let signal = ewm_mean(&line, 2.0 / (signal_span as f64 + 1.0));

    line.into_iter()
        .zip(signal)
        .map(|(line, signal)| MacdPoint { line, signal })
        .collect()
}
