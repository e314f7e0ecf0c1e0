use crate::models::{Candle, Timeframe};
use rust_decimal::Decimal;

/// Ticks older than this (wall clock minus trade time) get a timing warning
pub const DEFAULT_STALE_THRESHOLD_MS: i64 = 2_000;

/// What a tick did to the series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleEvent {
    /// The forming candle was updated in place
    SameCandle,
    /// A new candle was appended, preceded by `synthesized` flat candles for
    /// intervals that saw no trades
    NewCandle { synthesized: usize },
}

/// Gap-free OHLCV series for one (instrument, timeframe)
///
/// Consecutive candles are always exactly one interval apart. The last candle
/// is the one still forming; every earlier candle is closed.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    max_candles: usize,
    stale_threshold_ms: i64,
}

impl CandleSeries {
    /// Create an empty series
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep; the oldest are dropped
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, max_candles: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles: Vec::new(),
            max_candles: max_candles.max(1),
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
        }
    }

    /// Create a series seeded from exchange history
    ///
    /// History is sorted, de-duplicated and any holes are filled with flat
    /// candles so the contiguity invariant holds from the first tick on.
    pub fn from_history(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        mut history: Vec<Candle>,
        max_candles: usize,
    ) -> Self {
        let mut series = Self::new(symbol, timeframe, max_candles);
        history.sort_by_key(|c| c.timestamp_ms);
        history.dedup_by_key(|c| c.timestamp_ms);

        let interval = timeframe.interval_ms();
        let mut filled = 0usize;
        for candle in history {
            if let Some(last) = series.candles.last() {
                let mut next_ts = last.timestamp_ms + interval;
                let close = last.close;
                while next_ts < candle.timestamp_ms {
                    series.candles.push(Candle::flat(next_ts, close));
                    next_ts += interval;
                    filled += 1;
                }
            }
            series.candles.push(candle);
        }

        if filled > 0 {
            tracing::info!(
                symbol = %series.symbol,
                timeframe = %series.timeframe,
                filled,
                "Filled gaps in historical candles"
            );
        }

        series.trim();
        series
    }

    pub fn with_stale_threshold(mut self, threshold_ms: i64) -> Self {
        self.stale_threshold_ms = threshold_ms;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Fold one trade into the series
    ///
    /// `now_ms` is the wall clock used only for the staleness warning; stale
    /// ticks are still applied.
    pub fn ingest_tick(
        &mut self,
        price: Decimal,
        size: Decimal,
        timestamp_ms: i64,
        now_ms: i64,
    ) -> CandleEvent {
        let lag_ms = now_ms - timestamp_ms;
        if lag_ms >= self.stale_threshold_ms {
            tracing::warn!(
                symbol = %self.symbol,
                lag_ms,
                "{} milliseconds of difference between the current time and the trade time",
                lag_ms
            );
        }

        let interval = self.timeframe.interval_ms();

        let (last_start, last_close) = match self.candles.last_mut() {
            Some(last) if timestamp_ms < last.timestamp_ms + interval => {
                last.close = price;
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                last.volume += size;
                return CandleEvent::SameCandle;
            }
            Some(last) => (last.timestamp_ms, last.close),
            None => {
                let start = timestamp_ms.div_euclid(interval) * interval;
                self.candles.push(Candle::from_trade(start, price, size));
                return CandleEvent::NewCandle { synthesized: 0 };
            }
        };

        let skipped = ((timestamp_ms - last_start) / interval - 1) as usize;
        if skipped > 0 {
            tracing::info!(
                symbol = %self.symbol,
                timeframe = %self.timeframe,
                skipped,
                "Missing candles, filling with flat candles"
            );
        }

        // Flats older than the cap are never built
        let first = (skipped + 2).saturating_sub(self.max_candles).max(1);
        if first > 1 {
            self.candles.clear();
        }
        for i in first as i64..=skipped as i64 {
            self.candles
                .push(Candle::flat(last_start + i * interval, last_close));
        }

        let start = last_start + (skipped as i64 + 1) * interval;
        self.candles.push(Candle::from_trade(start, price, size));
        self.trim();

        tracing::debug!(
            symbol = %self.symbol,
            timeframe = %self.timeframe,
            start,
            "New candle"
        );

        CandleEvent::NewCandle { synthesized: skipped }
    }

    fn trim(&mut self) {
        if self.candles.len() > self.max_candles {
            let excess = self.candles.len() - self.max_candles;
            self.candles.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const MIN: i64 = 60_000;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn series() -> CandleSeries {
        CandleSeries::new("BTCUSDT", Timeframe::M1, 1000)
    }

    fn assert_contiguous(series: &CandleSeries) {
        for pair in series.candles().windows(2) {
            assert_eq!(pair[1].timestamp_ms, pair[0].timestamp_ms + MIN);
        }
    }

    #[test]
    fn test_single_boundary_crossing() {
        let mut s = series();
        assert_eq!(
            s.ingest_tick(d(100), d(1), 0, 0),
            CandleEvent::NewCandle { synthesized: 0 }
        );
        assert_eq!(s.ingest_tick(d(105), d(2), 30_000, 30_000), CandleEvent::SameCandle);
        assert_eq!(
            s.ingest_tick(d(103), d(1), 65_000, 65_000),
            CandleEvent::NewCandle { synthesized: 0 }
        );

        let candles = s.candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp_ms, 0);
        assert_eq!(candles[0].high, d(105));
        assert_eq!(candles[0].close, d(105));
        assert_eq!(candles[0].volume, d(3));
        assert_eq!(candles[1].timestamp_ms, 60_000);
        assert_eq!(candles[1].open, d(103));
    }

    #[test]
    fn test_skipped_intervals_are_synthesized() {
        let mut s = series();
        s.ingest_tick(d(100), d(1), 0, 0);
        s.ingest_tick(d(98), d(1), 20_000, 20_000);

        let event = s.ingest_tick(d(110), d(4), 185_000, 185_000);
        assert_eq!(event, CandleEvent::NewCandle { synthesized: 2 });

        let candles = s.candles();
        assert_eq!(candles.len(), 4);
        for flat in &candles[1..3] {
            assert_eq!(flat.open, d(98));
            assert_eq!(flat.high, d(98));
            assert_eq!(flat.low, d(98));
            assert_eq!(flat.close, d(98));
            assert_eq!(flat.volume, Decimal::ZERO);
        }
        assert_eq!(candles[1].timestamp_ms, 60_000);
        assert_eq!(candles[2].timestamp_ms, 120_000);
        assert_eq!(candles[3].timestamp_ms, 180_000);
        assert_eq!(candles[3].close, d(110));
        assert_eq!(candles[3].volume, d(4));
    }

    #[test]
    fn test_intra_candle_updates_low_and_high() {
        let mut s = series();
        s.ingest_tick(d(100), d(1), 0, 0);
        s.ingest_tick(d(90), d(1), 1_000, 1_000);
        s.ingest_tick(d(120), d(1), 2_000, 2_000);
        s.ingest_tick(d(95), d(1), 3_000, 3_000);

        let c = s.last().unwrap();
        assert_eq!((c.open, c.high, c.low, c.close), (d(100), d(120), d(90), d(95)));
    }

    #[test]
    fn test_replayed_same_candle_tick() {
        let mut s = series();
        s.ingest_tick(d(100), d(1), 0, 0);
        s.ingest_tick(d(101), d(2), 10_000, 10_000);
        let once = s.last().unwrap().clone();

        s.ingest_tick(d(101), d(2), 10_000, 10_000);
        let twice = s.last().unwrap();

        assert_eq!(twice.open, once.open);
        assert_eq!(twice.high, once.high);
        assert_eq!(twice.low, once.low);
        assert_eq!(twice.close, once.close);
        assert_eq!(twice.volume, once.volume + d(2));
    }

    #[test]
    fn test_replayed_boundary_tick_does_not_duplicate() {
        let mut s = series();
        s.ingest_tick(d(100), d(1), 0, 0);
        assert_eq!(
            s.ingest_tick(d(102), d(1), 61_000, 61_000),
            CandleEvent::NewCandle { synthesized: 0 }
        );
        assert_eq!(s.ingest_tick(d(102), d(1), 61_000, 61_000), CandleEvent::SameCandle);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_history_gaps_filled() {
        let history = vec![
            Candle::from_trade(2 * MIN, d(102), d(1)),
            Candle::from_trade(0, d(100), d(1)),
            Candle::from_trade(MIN, d(101), d(1)),
            Candle::from_trade(5 * MIN, d(105), d(1)),
        ];
        let s = CandleSeries::from_history("BTCUSDT", Timeframe::M1, history, 100);

        assert_eq!(s.len(), 6);
        assert_contiguous(&s);
        assert_eq!(s.candles()[3].close, d(102));
        assert_eq!(s.candles()[4].volume, Decimal::ZERO);
    }

    #[test]
    fn test_max_candles_limit() {
        let mut s = CandleSeries::new("BTCUSDT", Timeframe::M1, 5);
        for i in 0..10 {
            s.ingest_tick(d(100 + i), d(1), i * MIN, i * MIN);
        }

        assert_eq!(s.len(), 5);
        assert_eq!(s.candles()[0].close, d(105));
        assert_eq!(s.candles()[4].close, d(109));
        assert_contiguous(&s);
    }

    #[test]
    fn test_stale_tick_still_applied() {
        let mut s = series().with_stale_threshold(2_000);
        s.ingest_tick(d(100), d(1), 0, 0);
        // Ten seconds late, but never dropped
        assert_eq!(s.ingest_tick(d(99), d(1), 5_000, 15_000), CandleEvent::SameCandle);
        assert_eq!(s.last().unwrap().close, d(99));
    }

    #[test]
    fn test_first_tick_aligns_to_boundary() {
        let mut s = CandleSeries::new("BTCUSDT", Timeframe::M5, 10);
        s.ingest_tick(d(100), d(1), 7 * MIN + 1_234, 7 * MIN + 1_234);
        assert_eq!(s.last().unwrap().timestamp_ms, 5 * MIN);
    }

    #[test]
    fn test_long_outage_builds_only_capped_flats() {
        let mut s = CandleSeries::new("BTCUSDT", Timeframe::M1, 10);
        s.ingest_tick(d(100), d(1), 0, 0);
        s.ingest_tick(d(104), d(1), 10_000, 10_000);

        let year = 365 * 24 * 60 * MIN;
        assert_eq!(
            s.ingest_tick(d(120), d(2), year + 5_000, year + 5_000),
            CandleEvent::NewCandle { synthesized: 525_599 }
        );

        assert_eq!(s.len(), 10);
        assert_contiguous(&s);
        assert_eq!(s.candles()[0].timestamp_ms, year - 9 * MIN);
        assert_eq!(s.candles()[0].close, d(104));
        assert_eq!(s.candles()[0].volume, Decimal::ZERO);
        assert_eq!(s.last().unwrap().timestamp_ms, year);
        assert_eq!(s.last().unwrap().close, d(120));
    }

    #[test]
    fn test_random_increasing_ticks_stay_gap_free() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let mut s = series();
            let mut ts: i64 = rng.gen_range(0..MIN);
            for _ in 0..200 {
                let price = d(rng.gen_range(90..110));
                s.ingest_tick(price, d(1), ts, ts);
                ts += rng.gen_range(1..4 * MIN);
            }
            assert_contiguous(&s);
        }
    }
}
