use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::activation::{Activation, ActivationConfig, FeedMessage, SharedSeries};
use super::candle_series::{CandleSeries, DEFAULT_STALE_THRESHOLD_MS};
use super::log_stream::{LogEntry, LogStream};
use super::order_tracker::{OrderTracker, DEFAULT_POLL_INTERVAL};
use super::performance::PerformanceSummary;
use super::position_manager::{lock_book, PositionManager, SharedTradeBook, TradeBook};
use crate::api::ExchangeClient;
use crate::error::BotError;
use crate::models::{Candle, Contract, Tick, TickChannel, Trade};
use crate::strategy::StrategyKind;
use crate::Result;

/// Runtime knobs shared by every activation
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub order_poll_interval: Duration,
    pub stale_tick_threshold_ms: i64,
    pub max_candles: usize,
    pub tick_channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            order_poll_interval: DEFAULT_POLL_INTERVAL,
            stale_tick_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
            max_candles: 5_000,
            tick_channel_capacity: 1_024,
        }
    }
}

struct ActivationHandle {
    config: ActivationConfig,
    feed: mpsc::Sender<FeedMessage>,
    shutdown: watch::Sender<bool>,
    series: SharedSeries,
    book: SharedTradeBook,
    tracker: OrderTracker,
    task: JoinHandle<()>,
}

/// Runs strategy activations against one exchange
///
/// Each activation gets its own task and feed channel. The registry lock is
/// only held to look up or swap handles, never across an await.
pub struct Engine {
    exchange: Arc<dyn ExchangeClient>,
    settings: EngineSettings,
    activations: RwLock<HashMap<Uuid, ActivationHandle>>,
    subscribed: Mutex<HashSet<String>>,
    logs: LogStream,
}

impl Engine {
    pub fn new(exchange: Arc<dyn ExchangeClient>, settings: EngineSettings) -> Self {
        Self {
            exchange,
            settings,
            activations: RwLock::new(HashMap::new()),
            subscribed: Mutex::new(HashSet::new()),
            logs: LogStream::new(),
        }
    }

    pub fn logs(&self) -> &LogStream {
        &self.logs
    }

    /// Unconsumed log entries, marked consumed
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        self.logs.take_unconsumed()
    }

    /// Start a strategy on a contract and timeframe
    ///
    /// Refused when a parameter is missing or invalid, the symbol is unknown,
    /// or the exchange has no history for it. Every refusal is also logged.
    pub async fn activate(&self, config: ActivationConfig) -> Result<Uuid> {
        match self.start(config.clone()).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.logs.push(format!(
                    "{} strategy on {} / {} not started: {}",
                    config.strategy, config.symbol, config.timeframe, e
                ));
                Err(e)
            }
        }
    }

    async fn start(&self, config: ActivationConfig) -> Result<Uuid> {
        let strategy = StrategyKind::from_params(config.strategy, &config.parameters)?;
        let contract = self
            .exchange
            .contract(&config.symbol)
            .ok_or_else(|| BotError::UnknownContract(config.symbol.clone()))?;

        let history = self
            .exchange
            .get_historical_candles(&contract, config.timeframe)
            .await?;
        if history.is_empty() {
            return Err(BotError::NoHistoricalData(format!(
                "{} {}",
                contract.symbol, config.timeframe
            )));
        }

        self.subscribe_once(&contract).await?;

        let series: SharedSeries = Arc::new(RwLock::new(
            CandleSeries::from_history(
                contract.symbol.clone(),
                config.timeframe,
                history,
                self.settings.max_candles,
            )
            .with_stale_threshold(self.settings.stale_tick_threshold_ms),
        ));

        let book = TradeBook::shared();
        let tracker = OrderTracker::new(
            self.exchange.clone(),
            contract.clone(),
            book.clone(),
            self.logs.clone(),
            self.settings.order_poll_interval,
        );
        let positions = PositionManager::new(
            self.exchange.clone(),
            contract.clone(),
            config.timeframe,
            strategy.name(),
            book.clone(),
            tracker.clone(),
            self.logs.clone(),
        );

        let id = Uuid::new_v4();
        let activation = Activation::new(id, strategy, series.clone(), positions);
        let (feed_tx, feed_rx) = mpsc::channel(self.settings.tick_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(activation.run(feed_rx, shutdown_rx));

        self.activations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                ActivationHandle {
                    config: config.clone(),
                    feed: feed_tx,
                    shutdown: shutdown_tx,
                    series,
                    book,
                    tracker,
                    task,
                },
            );

        tracing::info!(
            activation = %id,
            symbol = %config.symbol,
            timeframe = %config.timeframe,
            "Activation started"
        );
        self.logs.push(format!(
            "{} strategy on {} / {} started",
            config.strategy, config.symbol, config.timeframe
        ));
        Ok(id)
    }

    /// Subscribe a contract's tick channels the first time it is used
    async fn subscribe_once(&self, contract: &Contract) -> Result<()> {
        let first = self
            .subscribed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(contract.symbol.clone());
        if !first {
            return Ok(());
        }

        let channels = [TickChannel::AggTrade, TickChannel::BookTicker];
        if let Err(e) = self.exchange.subscribe_ticks(contract, &channels).await {
            self.subscribed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&contract.symbol);
            return Err(e);
        }
        tracing::info!(symbol = %contract.symbol, "Subscribed to tick stream");
        Ok(())
    }

    /// Stop an activation
    ///
    /// Waits for the tick in progress to finish, then stops evaluation and
    /// order polling. Orders already placed stay at the exchange.
    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        let handle = self
            .activations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .ok_or(BotError::ActivationNotFound(id))?;

        let _ = handle.shutdown.send(true);
        handle.tracker.cancel_all();
        if let Err(e) = handle.task.await {
            tracing::warn!(activation = %id, error = %e, "Activation task ended abnormally");
        }

        self.logs.push(format!(
            "{} strategy on {} / {} stopped",
            handle.config.strategy, handle.config.symbol, handle.config.timeframe
        ));
        Ok(())
    }

    /// Stop every activation
    pub async fn shutdown(&self) {
        for id in self.activation_ids() {
            if let Err(e) = self.deactivate(id).await {
                tracing::warn!(activation = %id, error = %e, "Deactivation failed");
            }
        }
    }

    /// Route a tick to every activation on its symbol
    ///
    /// Returns how many activations received it. Waits when a feed is full,
    /// so ticks are never dropped.
    pub async fn dispatch_tick(&self, tick: Tick) -> usize {
        let feeds: Vec<mpsc::Sender<FeedMessage>> = self
            .activations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|h| h.config.symbol == tick.symbol)
            .map(|h| h.feed.clone())
            .collect();

        let mut delivered = 0;
        for feed in feeds {
            if feed.send(FeedMessage::Tick(tick.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait until every activation has processed all ticks dispatched so far
    pub async fn flush(&self) {
        let feeds: Vec<mpsc::Sender<FeedMessage>> = self
            .activations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|h| h.feed.clone())
            .collect();

        for feed in feeds {
            let (ack_tx, ack_rx) = oneshot::channel();
            if feed.send(FeedMessage::Flush(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    pub fn activation_ids(&self) -> Vec<Uuid> {
        self.activations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    pub fn config(&self, id: Uuid) -> Result<ActivationConfig> {
        self.with_handle(id, |h| h.config.clone())
    }

    fn with_handle<T>(&self, id: Uuid, f: impl FnOnce(&ActivationHandle) -> T) -> Result<T> {
        self.activations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(f)
            .ok_or(BotError::ActivationNotFound(id))
    }

    /// Copy of an activation's trades in open order
    pub fn trades(&self, id: Uuid) -> Result<Vec<Trade>> {
        self.with_handle(id, |h| lock_book(&h.book).trades().to_vec())
    }

    pub fn ongoing_position(&self, id: Uuid) -> Result<bool> {
        self.with_handle(id, |h| lock_book(&h.book).ongoing_position())
    }

    /// Copy of an activation's candle series
    pub fn candles(&self, id: Uuid) -> Result<Vec<Candle>> {
        self.with_handle(id, |h| {
            h.series
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .candles()
                .to_vec()
        })
    }

    pub fn performance(&self, id: Uuid) -> Result<PerformanceSummary> {
        self.trades(id).map(|t| PerformanceSummary::from_trades(&t))
    }

    /// Orders still being polled for an activation
    pub fn pending_orders(&self, id: Uuid) -> Result<usize> {
        self.with_handle(id, |h| h.tracker.in_flight())
    }
}
