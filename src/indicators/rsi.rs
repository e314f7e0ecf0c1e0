use super::moving_average::ewm_mean;

/// RSI series aligned with `prices`
///
/// Gains and losses are smoothed Wilder-style (alpha = 1 / period) and a value
/// only appears once `period` price changes have been observed. Values are
/// rounded to two decimals. The first element is always `None`.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < 2 {
        return out;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for pair in prices.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_mean(&gains, alpha);
    let avg_loss = ewm_mean(&losses, alpha);

    for (j, (gain, loss)) in avg_gain.iter().zip(avg_loss.iter()).enumerate() {
        if j + 1 < period {
            continue;
        }

        let rsi = if *loss == 0.0 {
            if *gain == 0.0 {
                continue;
            }
            100.0
        } else {
            let rs = gain / loss;
            100.0 - 100.0 / (1.0 + rs)
        };

        if rsi.is_finite() {
            out[j + 1] = Some((rsi * 100.0).round() / 100.0);
        }
    }

    out
}

/// Latest RSI value
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    calculate_rsi_series(prices, period).last().copied().flatten()
}
