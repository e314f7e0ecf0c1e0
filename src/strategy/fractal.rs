use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{EntryLevels, StrategyParams};
use crate::indicators::{
    bearish_fractal, bullish_fractal, calculate_ema_series, calculate_rsi_series, closes,
    last_closed,
};
use crate::models::{Candle, ExitReason, Signal, Trade, TradeSide};
use crate::Result;

/// Fractal-stop trend strategy
///
/// The latest fractal found while flat is kept as the stop level per side. Entries need
/// RSI and a fast/slow/very-slow EMA alignment around the last closed candle,
/// plus at least one recorded stop on that side. Size comes from the risk to
/// the stop and the target sits at 1.7x that risk.
#[derive(Debug, Clone)]
pub struct FractalStrategy {
    pub rsi_length: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_very_slow: usize,
    pub risk_pct: Decimal,
    long_stop: Option<Decimal>,
    short_stop: Option<Decimal>,
}

/// Reward-to-risk multiple for the take-profit
fn reward_ratio() -> Decimal {
    Decimal::new(17, 1)
}

fn band_low(low: Decimal) -> Decimal {
    low * (Decimal::ONE - Decimal::new(2, 4))
}

fn band_high(high: Decimal) -> Decimal {
    high * (Decimal::ONE + Decimal::new(2, 4))
}

impl FractalStrategy {
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            rsi_length: params.period("rsi_length")?,
            ema_fast: params.period("ema_fast")?,
            ema_slow: params.period("ema_slow")?,
            ema_very_slow: params.period("ema_very_slow")?,
            risk_pct: params.decimal("risk_pct")?,
            long_stop: None,
            short_stop: None,
        })
    }

    /// Record any fractal completed by the latest candle, replacing the previous
    /// stop on that side
    pub fn record_fractals(&mut self, candles: &[Candle]) {
        if let Some(stop) = bullish_fractal(candles) {
            tracing::debug!(stop = %stop, "Bullish fractal");
            self.long_stop = Some(stop);
        }
        if let Some(stop) = bearish_fractal(candles) {
            tracing::debug!(stop = %stop, "Bearish fractal");
            self.short_stop = Some(stop);
        }
    }

    /// Most recent fractal stop for a side
    pub fn stop_for(&self, side: TradeSide) -> Option<Decimal> {
        match side {
            TradeSide::Long => self.long_stop,
            TradeSide::Short => self.short_stop,
        }
    }

    pub fn evaluate_signal(&self, candles: &[Candle]) -> Signal {
        let n = candles.len();
        if n < 2 {
            return Signal::Hold;
        }

        let prices = closes(candles);
        let rsi = match last_closed(&calculate_rsi_series(&prices, self.rsi_length)).flatten() {
            Some(rsi) => rsi,
            None => return Signal::Hold,
        };
        let (fast, slow, very_slow) = match (
            last_closed(&calculate_ema_series(&prices, self.ema_fast)),
            last_closed(&calculate_ema_series(&prices, self.ema_slow)),
            last_closed(&calculate_ema_series(&prices, self.ema_very_slow)),
        ) {
            (Some(f), Some(s), Some(v)) => (f, s, v),
            _ => return Signal::Hold,
        };

        let pivot = &candles[n - 2];
        let low = band_low(pivot.low).to_f64().unwrap_or(f64::NAN);
        let high = band_high(pivot.high).to_f64().unwrap_or(f64::NAN);

        let buy = rsi > 45.0 && low > slow && low < fast && low > very_slow;
        if buy && self.stop_for(TradeSide::Long).is_some() {
            return Signal::Buy;
        }

        let sell = rsi < 55.0 && high < slow && high > fast && high < very_slow;
        if sell && self.stop_for(TradeSide::Short).is_some() {
            return Signal::Sell;
        }

        Signal::Hold
    }

    fn target(entry: Decimal, stop: Decimal) -> Decimal {
        (entry - stop) * reward_ratio() + entry
    }

    pub fn entry_levels(&self, side: TradeSide, price: Decimal) -> EntryLevels {
        match self.stop_for(side) {
            Some(stop) => EntryLevels {
                stop_loss: Some(stop),
                take_profit: Some(Self::target(price, stop)),
            },
            None => EntryLevels::default(),
        }
    }

    /// Stop takes precedence when both would trigger
    pub fn exit_check(&self, trade: &Trade, price: Decimal) -> Option<ExitReason> {
        let entry = trade.entry_price?;
        let stop = trade.stop_loss.or_else(|| self.stop_for(trade.side))?;
        let target = Self::target(entry, stop);

        match trade.side {
            TradeSide::Long if price <= stop => Some(ExitReason::StopLoss),
            TradeSide::Long if price >= target => Some(ExitReason::TakeProfit),
            TradeSide::Short if price >= stop => Some(ExitReason::StopLoss),
            TradeSide::Short if price <= target => Some(ExitReason::TakeProfit),
            _ => None,
        }
    }
}
