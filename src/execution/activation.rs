use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::candle_series::{CandleEvent, CandleSeries};
use super::position_manager::{lock_book, PositionManager};
use crate::models::{Candle, Tick, Timeframe, TradeSide};
use crate::strategy::{StrategyKind, StrategyParams, StrategyVariant};
use crate::Result;

/// What the operator asks to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    pub strategy: StrategyVariant,
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub parameters: StrategyParams,
}

/// Where an activation stands in its trade lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    OpeningPosition,
    Open,
    Closing,
}

/// Message on an activation's feed channel
#[derive(Debug)]
pub(crate) enum FeedMessage {
    Tick(Tick),
    /// Acknowledged once every earlier tick has been processed
    Flush(oneshot::Sender<()>),
}

pub type SharedSeries = Arc<RwLock<CandleSeries>>;

/// One strategy running on one (instrument, timeframe)
///
/// Owns the candle series and drives the strategy through
/// Idle → OpeningPosition → Open → Closing → Idle. Ticks are handled one at a
/// time in arrival order.
pub struct Activation {
    id: Uuid,
    strategy: StrategyKind,
    series: SharedSeries,
    positions: PositionManager,
    phase: Phase,
}

impl Activation {
    pub fn new(
        id: Uuid,
        strategy: StrategyKind,
        series: SharedSeries,
        positions: PositionManager,
    ) -> Self {
        Self {
            id,
            strategy,
            series,
            positions,
            phase: Phase::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(activation = %self.id, from = ?self.phase, to = ?phase, "Phase change");
            self.phase = phase;
        }
    }

    /// Re-derive the phase from the trade book
    ///
    /// The order tracker may close a rejected entry between ticks.
    fn sync_phase(&mut self) {
        let open = self.positions.ongoing_position();
        match (self.phase, open) {
            (Phase::Open, false) => self.set_phase(Phase::Idle),
            (Phase::Idle, true) => self.set_phase(Phase::Open),
            _ => {}
        }
    }

    fn snapshot_candles(&self) -> Vec<Candle> {
        self.series
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .candles()
            .to_vec()
    }

    /// Fold one tick in and react to it
    pub async fn on_tick(&mut self, tick: &Tick, now_ms: i64) {
        let event = self
            .series
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .ingest_tick(tick.price, tick.size, tick.timestamp_ms, now_ms);

        self.sync_phase();

        if self.phase == Phase::Open {
            self.check_exit(tick, now_ms).await;
        }

        if let CandleEvent::NewCandle { .. } = event {
            if self.phase == Phase::Idle {
                self.evaluate(tick, now_ms).await;
            }
        }
    }

    async fn check_exit(&mut self, tick: &Tick, now_ms: i64) {
        let trade = {
            let mut book = lock_book(self.positions.book());
            book.mark_to_market(tick.price);
            book.open_trade().cloned()
        };
        let Some(trade) = trade else {
            return;
        };
        let Some(reason) = self.strategy.exit_check(&trade, tick.price) else {
            return;
        };

        self.set_phase(Phase::Closing);
        match self
            .positions
            .close(trade.id, reason, tick.price, now_ms)
            .await
        {
            Ok(_) => self.set_phase(Phase::Idle),
            Err(e) => {
                tracing::warn!(
                    symbol = %tick.symbol,
                    trade = %trade.id,
                    error = %e,
                    "Exit failed, retrying on next tick"
                );
                self.set_phase(Phase::Open);
            }
        }
    }

    async fn evaluate(&mut self, tick: &Tick, now_ms: i64) {
        let candles = self.snapshot_candles();
        self.strategy.observe(&candles);

        let Some(side) = self.strategy.evaluate_signal(&candles).side() else {
            return;
        };
        if !self.positions.can_open(side) {
            tracing::debug!(symbol = %tick.symbol, "Short signal ignored on spot market");
            return;
        }

        self.set_phase(Phase::OpeningPosition);
        match self.open(side, tick.price, now_ms).await {
            Ok(Some(_)) => self.set_phase(Phase::Open),
            Ok(None) => self.set_phase(Phase::Idle),
            Err(e) if e.is_sizing_unavailable() => {
                tracing::debug!(symbol = %tick.symbol, reason = %e, "Signal skipped");
                self.set_phase(Phase::Idle);
            }
            Err(e) => {
                tracing::warn!(symbol = %tick.symbol, error = %e, "Entry failed");
                self.set_phase(Phase::Idle);
            }
        }
    }

    async fn open(&self, side: TradeSide, price: Decimal, now_ms: i64) -> Result<Option<Uuid>> {
        let balance = self.positions.quote_balance().await?;
        let lot_size = self.positions.contract().lot_size;
        let quantity = self.strategy.size_trade(side, price, balance, lot_size)?;
        let levels = self.strategy.entry_levels(side, price);
        self.positions.open(side, quantity, levels, now_ms).await
    }

    /// Consume the feed until shutdown is signalled or the feed closes
    ///
    /// Shutdown is only observed between ticks, so a tick being processed
    /// always completes. Pending-order polling stops with the loop.
    pub(crate) async fn run(
        mut self,
        mut feed: mpsc::Receiver<FeedMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = feed.recv() => match message {
                    Some(FeedMessage::Tick(tick)) => {
                        let now_ms = Utc::now().timestamp_millis();
                        self.on_tick(&tick, now_ms).await;
                    }
                    Some(FeedMessage::Flush(ack)) => {
                        let _ = ack.send(());
                    }
                    None => break,
                },
            }
        }

        self.positions.tracker().cancel_all();
        tracing::debug!(activation = %self.id, "Activation loop finished");
    }
}
