use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::log_stream::LogStream;
use super::position_manager::{lock_book, SharedTradeBook};
use crate::api::ExchangeClient;
use crate::models::{Contract, OrderState};

/// Backoff between status polls of a pending order
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

struct TrackerInner {
    exchange: Arc<dyn ExchangeClient>,
    contract: Contract,
    book: SharedTradeBook,
    logs: LogStream,
    poll_interval: Duration,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Polls pending entry orders in the background until they settle
///
/// One task per order id. A task only writes the entry fields of its own
/// unfilled trade; everything else on that trade belongs to the tick path.
/// Polling never gives up on its own: an unknown or erroring status is
/// retried after the same backoff until the order fills, is rejected, or the
/// owning activation cancels the tracker.
#[derive(Clone)]
pub struct OrderTracker {
    inner: Arc<TrackerInner>,
}

impl OrderTracker {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        contract: Contract,
        book: SharedTradeBook,
        logs: LogStream,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                exchange,
                contract,
                book,
                logs,
                poll_interval,
                tasks: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start polling `order_id` on behalf of `trade_id`
    ///
    /// Returns false once the tracker has been cancelled or when the order is
    /// already tracked.
    pub fn track(&self, order_id: String, trade_id: Uuid) -> bool {
        if self.inner.closed.load(Ordering::SeqCst) {
            return false;
        }

        // Held across spawn so the task cannot deregister before it is registered
        let mut tasks = self.tasks();
        if tasks.contains_key(&order_id) {
            return false;
        }

        let tracker = self.clone();
        let id = order_id.clone();
        let handle = tokio::spawn(async move {
            tracker.poll_until_settled(&id, trade_id).await;
            tracker.tasks().remove(&id);
        });
        tasks.insert(order_id, handle);
        true
    }

    /// Number of orders still being polled
    pub fn in_flight(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop every poller and refuse new ones
    ///
    /// Orders already at the exchange are left alone.
    pub fn cancel_all(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.tasks().drain().collect();
        for (order_id, handle) in handles {
            handle.abort();
            tracing::debug!(order_id = %order_id, "Order polling cancelled");
        }
    }

    async fn poll_until_settled(&self, order_id: &str, trade_id: Uuid) {
        let inner = &self.inner;

        loop {
            tokio::time::sleep(inner.poll_interval).await;

            let status = match inner.exchange.get_order_status(&inner.contract, order_id).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    tracing::debug!(order_id, "Order status unknown, polling again");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(order_id, error = %e, "Order status query failed, polling again");
                    continue;
                }
            };

            match (status.state, status.avg_fill_price) {
                (OrderState::Pending, _) => continue,
                (OrderState::Filled, Some(price)) => {
                    let recorded =
                        lock_book(&inner.book).record_fill(trade_id, price, status.executed_qty);
                    if recorded {
                        inner.logs.push(format!(
                            "Order {} on {} filled at {}",
                            order_id, inner.contract.symbol, price
                        ));
                    }
                    return;
                }
                (OrderState::Filled, None) => {
                    tracing::warn!(order_id, "Filled order reported without a price, polling again");
                    continue;
                }
                (OrderState::Rejected, _) => {
                    let now_ms = Utc::now().timestamp_millis();
                    if lock_book(&inner.book).reject_entry(trade_id, now_ms) {
                        inner.logs.push(format!(
                            "Order {} on {} was rejected, trade closed",
                            order_id, inner.contract.symbol
                        ));
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FillMode, PaperExchange};
    use crate::execution::position_manager::TradeBook;
    use crate::models::{MarketKind, OrderSide, OrderType, Trade, TradeSide, TradeStatus};
    use rust_decimal::Decimal;

    fn btc() -> Contract {
        Contract {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            lot_size: Decimal::new(1, 3),
        }
    }

    fn pending_trade(order_id: &str) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            opened_at_ms: 0,
            entry_price: None,
            symbol: "BTCUSDT".to_string(),
            strategy_name: "Dummy".to_string(),
            side: TradeSide::Long,
            status: TradeStatus::Open,
            pnl: Decimal::ZERO,
            quantity: Decimal::ONE,
            entry_order_id: order_id.to_string(),
            stop_loss: None,
            take_profit: None,
            exit_price: None,
            closed_at_ms: None,
            exit_reason: None,
        }
    }

    /// Place one pending order and register its trade in a fresh book
    async fn setup(mode: FillMode) -> (Arc<PaperExchange>, OrderTracker, SharedTradeBook, Uuid, String) {
        let exchange = Arc::new(PaperExchange::new(MarketKind::Futures).with_contract(btc()));
        exchange.set_balance("USDT", Decimal::from(10_000));
        exchange.mark_price("BTCUSDT", Decimal::from(100));
        exchange.set_fill_mode(mode);

        let status = exchange
            .place_order(&btc(), OrderType::Market, Decimal::ONE, OrderSide::Buy)
            .await
            .unwrap();

        let book = TradeBook::shared();
        let trade = pending_trade(&status.order_id);
        let trade_id = trade.id;
        lock_book(&book).insert(trade).unwrap();

        let tracker = OrderTracker::new(
            exchange.clone(),
            btc(),
            book.clone(),
            LogStream::new(),
            DEFAULT_POLL_INTERVAL,
        );
        (exchange, tracker, book, trade_id, status.order_id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_stays_unset_until_filled_poll() {
        let (exchange, tracker, book, trade_id, order_id) =
            setup(FillMode::AfterPolls { polls: 2 }).await;

        assert!(tracker.track(order_id, trade_id));

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(lock_book(&book).get(trade_id).unwrap().entry_price, None);
        assert_eq!(tracker.in_flight(), 1);

        exchange.mark_price("BTCUSDT", Decimal::from(102));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            lock_book(&book).get(trade_id).unwrap().entry_price,
            Some(Decimal::from(102))
        );
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_retried() {
        let (exchange, tracker, book, trade_id, order_id) =
            setup(FillMode::AfterPolls { polls: 1 }).await;
        exchange.hide_next_statuses(5);

        tracker.track(order_id, trade_id);
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(lock_book(&book).get(trade_id).unwrap().entry_price, None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            lock_book(&book).get(trade_id).unwrap().entry_price,
            Some(Decimal::from(100))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_entry_closes_trade() {
        let (_, tracker, book, trade_id, order_id) = setup(FillMode::RejectLater).await;

        tracker.track(order_id, trade_id);
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let book = lock_book(&book);
        let trade = book.get(trade_id).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.quantity, Decimal::ZERO);
        assert!(!book.ongoing_position());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let (_, tracker, book, trade_id, order_id) =
            setup(FillMode::AfterPolls { polls: 1 }).await;

        tracker.track(order_id.clone(), trade_id);
        tracker.cancel_all();
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.track(order_id, trade_id));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(lock_book(&book).get(trade_id).unwrap().entry_price, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_order_not_tracked_twice() {
        let (_, tracker, _, trade_id, order_id) = setup(FillMode::AfterPolls { polls: 9 }).await;

        assert!(tracker.track(order_id.clone(), trade_id));
        assert!(!tracker.track(order_id, trade_id));
        assert_eq!(tracker.in_flight(), 1);
        tracker.cancel_all();
    }
}
