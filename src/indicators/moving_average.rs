/// Exponentially weighted mean with bias-adjusted weights
///
/// Each output is `sum((1-alpha)^i * x[t-i]) / sum((1-alpha)^i)` over the whole
/// history up to `t`, so early values are not dragged towards zero.
pub fn ewm_mean(values: &[f64], alpha: f64) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    values
        .iter()
        .map(|&x| {
            numerator = x + decay * numerator;
            denominator = 1.0 + decay * denominator;
            numerator / denominator
        })
        .collect()
}

/// EMA series for a span (alpha = 2 / (span + 1))
pub fn calculate_ema_series(prices: &[f64], span: usize) -> Vec<f64> {
    if span == 0 {
        return vec![f64::NAN; prices.len()];
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    ewm_mean(prices, alpha)
}

/// Latest EMA value
pub fn calculate_ema(prices: &[f64], span: usize) -> Option<f64> {
    calculate_ema_series(prices, span)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_ewm_weights() {
        let ema = calculate_ema_series(&[1.0, 2.0, 3.0], 3);
        assert!(approx(ema[0], 1.0));
        assert!(approx(ema[1], 2.5 / 1.5));
        assert!(approx(ema[2], 4.25 / 1.75));
    }

    #[test]
    fn test_span_one_tracks_price() {
        let prices = vec![100.0, 102.0, 99.0];
        assert_eq!(calculate_ema_series(&prices, 1), prices);
    }

    #[test]
    fn test_ema_empty() {
        assert!(calculate_ema(&[], 5).is_none());
        assert!(calculate_ema(&[1.0, 2.0], 0).is_none());
    }

    #[test]
    fn test_ema_lags_uptrend() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let ema = calculate_ema(&prices, 5).unwrap();
        assert!(ema < 119.0);
        assert!(ema > 110.0);
    }
}
