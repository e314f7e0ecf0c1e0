use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::models::{Candle, Tick, Timeframe};
use crate::Result;

/// Seeded random-walk tick generator
///
/// Produces the same sequence for the same seed, so runs are reproducible.
pub struct SyntheticFeed {
    rng: StdRng,
    symbol: String,
    price: f64,
    timestamp_ms: i64,
    step_ms: i64,
    /// Max relative move per tick (0.001 = ±0.1%)
    volatility: f64,
}

impl SyntheticFeed {
    pub fn new(seed: u64, symbol: impl Into<String>, start_price: Decimal, start_ms: i64, step_ms: i64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            symbol: symbol.into(),
            price: start_price.to_f64().unwrap_or(100.0),
            timestamp_ms: start_ms,
            step_ms: step_ms.max(1),
            volatility: 0.001,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn step_price(&mut self) -> f64 {
        let change = self.price * self.rng.gen_range(-self.volatility..=self.volatility);
        // Keep the walk away from zero
        self.price = (self.price + change).max(0.01);
        self.price
    }

    fn to_price(value: f64) -> Decimal {
        Decimal::from_f64(value)
            .map(|d| d.round_dp(2))
            .unwrap_or(Decimal::ONE)
    }

    pub fn next_tick(&mut self) -> Tick {
        let price = Self::to_price(self.step_price());
        let size = Decimal::from_f64(self.rng.gen_range(0.01..2.0))
            .map(|d| d.round_dp(3))
            .unwrap_or(Decimal::ONE);
        let tick = Tick {
            symbol: self.symbol.clone(),
            price,
            size,
            timestamp_ms: self.timestamp_ms,
        };
        self.timestamp_ms += self.step_ms;
        tick
    }

    /// `count` closed candles ending just before `end_ms`, walking forward
    /// from the current price; the feed continues from the last close
    pub fn history(&mut self, count: usize, timeframe: Timeframe, end_ms: i64) -> Vec<Candle> {
        let interval = timeframe.interval_ms();
        let last_start = end_ms.div_euclid(interval) * interval - interval;
        let first_start = last_start - (count as i64 - 1) * interval;

        let mut candles = Vec::with_capacity(count);
        for i in 0..count as i64 {
            let open = self.price;
            let mut high = open;
            let mut low = open;
            for _ in 0..4 {
                let p = self.step_price();
                high = high.max(p);
                low = low.min(p);
            }
            let volume = self.rng.gen_range(1.0..50.0);
            candles.push(Candle {
                timestamp_ms: first_start + i * interval,
                open: Self::to_price(open),
                high: Self::to_price(high),
                low: Self::to_price(low),
                close: Self::to_price(self.price),
                volume: Decimal::from_f64(volume)
                    .map(|d| d.round_dp(3))
                    .unwrap_or(Decimal::ONE),
            });
        }
        candles
    }
}

impl Iterator for SyntheticFeed {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        Some(self.next_tick())
    }
}

/// Read recorded ticks, one JSON object per line
///
/// Blank lines are skipped; a malformed line fails the whole read.
pub fn read_ticks_jsonl(path: impl AsRef<Path>) -> Result<Vec<Tick>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ticks = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        ticks.push(serde_json::from_str(&line)?);
    }
    Ok(ticks)
}
