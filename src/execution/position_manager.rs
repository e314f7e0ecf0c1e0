use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::log_stream::LogStream;
use super::order_tracker::OrderTracker;
use crate::api::ExchangeClient;
use crate::error::BotError;
use crate::models::{
    Balance, Contract, ExitReason, MarketKind, OrderSide, OrderState, OrderType, Timeframe, Trade,
    TradeSide, TradeStatus,
};
use crate::strategy::sizing::floor_to_lot;
use crate::strategy::EntryLevels;
use crate::Result;

/// Trades of one activation in open order
///
/// At most one trade is open at a time; `ongoing_position` is derived from
/// the list rather than stored next to it.
#[derive(Debug, Default)]
pub struct TradeBook {
    trades: Vec<Trade>,
}

/// Trade list shared between the tick path and the order tracker
pub type SharedTradeBook = Arc<Mutex<TradeBook>>;

pub(crate) fn lock_book(book: &SharedTradeBook) -> MutexGuard<'_, TradeBook> {
    book.lock().unwrap_or_else(|e| e.into_inner())
}

impl TradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTradeBook {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// True iff exactly one trade is open
    pub fn ongoing_position(&self) -> bool {
        self.trades.iter().filter(|t| t.is_open()).count() == 1
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.trades.iter().find(|t| t.is_open())
    }

    pub fn get(&self, id: Uuid) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut Trade> {
        self.trades.iter_mut().find(|t| t.id == id)
    }

    /// Append a freshly opened trade
    pub fn insert(&mut self, trade: Trade) -> Result<()> {
        if self.open_trade().is_some() {
            return Err(BotError::OrderRejected(format!(
                "{} already has an open trade",
                trade.symbol
            )));
        }
        self.trades.push(trade);
        Ok(())
    }

    /// Backfill the entry of a trade whose order was pending
    ///
    /// Returns false when the trade is gone, closed, or already filled.
    pub fn record_fill(&mut self, id: Uuid, price: Decimal, quantity: Decimal) -> bool {
        match self.get_mut(id) {
            Some(trade) if trade.is_open() && trade.entry_price.is_none() => {
                trade.entry_price = Some(price);
                if quantity > Decimal::ZERO {
                    trade.quantity = quantity;
                }
                true
            }
            _ => false,
        }
    }

    /// Close an unfilled trade whose entry order the exchange rejected
    pub fn reject_entry(&mut self, id: Uuid, now_ms: i64) -> bool {
        match self.get_mut(id) {
            Some(trade) if trade.is_open() && trade.entry_price.is_none() => {
                trade.status = TradeStatus::Closed;
                trade.quantity = Decimal::ZERO;
                trade.pnl = Decimal::ZERO;
                trade.closed_at_ms = Some(now_ms);
                trade.exit_reason = Some(ExitReason::EntryRejected);
                true
            }
            _ => false,
        }
    }

    /// Refresh unrealized PnL of the open, filled trade
    pub fn mark_to_market(&mut self, price: Decimal) {
        if let Some(trade) = self.trades.iter_mut().find(|t| t.is_live()) {
            if let Some(pnl) = trade.pnl_at(price) {
                trade.pnl = pnl;
            }
        }
    }

    /// Close a filled trade, returning the PnL realized on `exit_quantity`
    ///
    /// The trade's quantity becomes the quantity actually sold or bought back.
    pub fn close(
        &mut self,
        id: Uuid,
        exit_price: Decimal,
        exit_quantity: Decimal,
        reason: ExitReason,
        now_ms: i64,
    ) -> Option<Decimal> {
        let trade = self.get_mut(id).filter(|t| t.is_live())?;
        let entry = trade.entry_price?;
        let pnl = match trade.side {
            TradeSide::Long => (exit_price - entry) * exit_quantity,
            TradeSide::Short => (entry - exit_price) * exit_quantity,
        };
        trade.status = TradeStatus::Closed;
        trade.quantity = exit_quantity;
        trade.pnl = pnl;
        trade.exit_price = Some(exit_price);
        trade.closed_at_ms = Some(now_ms);
        trade.exit_reason = Some(reason);
        Some(pnl)
    }
}

/// Places entry and exit orders for one activation and keeps its trade book
pub struct PositionManager {
    exchange: Arc<dyn ExchangeClient>,
    contract: Contract,
    timeframe: Timeframe,
    strategy_name: String,
    book: SharedTradeBook,
    tracker: OrderTracker,
    logs: LogStream,
}

impl PositionManager {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        contract: Contract,
        timeframe: Timeframe,
        strategy_name: impl Into<String>,
        book: SharedTradeBook,
        tracker: OrderTracker,
        logs: LogStream,
    ) -> Self {
        Self {
            exchange,
            contract,
            timeframe,
            strategy_name: strategy_name.into(),
            book,
            tracker,
            logs,
        }
    }

    pub fn book(&self) -> &SharedTradeBook {
        &self.book
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Spot wallets cannot open shorts
    pub fn can_open(&self, side: TradeSide) -> bool {
        !(self.exchange.market_kind() == MarketKind::Spot && side == TradeSide::Short)
    }

    pub fn ongoing_position(&self) -> bool {
        lock_book(&self.book).ongoing_position()
    }

    /// Free quote-asset balance used to size new trades
    pub async fn quote_balance(&self) -> Result<Decimal> {
        let balances = self.exchange.get_balances().await?;
        balances
            .get(&self.contract.quote_asset)
            .map(|b| b.available())
            .ok_or_else(|| {
                BotError::SizingUnavailable(format!("no {} balance", self.contract.quote_asset))
            })
    }

    fn free_balance(balances: &HashMap<String, Balance>, asset: &str) -> Decimal {
        balances
            .get(asset)
            .map(|b| b.available())
            .unwrap_or(Decimal::ZERO)
    }

    /// Place a market entry order and record the trade
    ///
    /// Returns `Ok(None)` when nothing was placed: a short on spot, or a
    /// position already open. The trade keeps `entry_price = None` until the
    /// order is confirmed filled.
    pub async fn open(
        &self,
        side: TradeSide,
        quantity: Decimal,
        levels: EntryLevels,
        now_ms: i64,
    ) -> Result<Option<Uuid>> {
        if !self.can_open(side) {
            tracing::debug!(symbol = %self.contract.symbol, "Short signal ignored on spot market");
            return Ok(None);
        }
        if self.ongoing_position() {
            return Ok(None);
        }

        self.logs.push(format!(
            "{} signal on {} {}",
            side, self.contract.symbol, self.timeframe
        ));

        let order_side = side.entry_order_side();
        let status = match self
            .exchange
            .place_order(&self.contract, OrderType::Market, quantity, order_side)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                self.logs.push(format!(
                    "{} order on {} {} failed: {}",
                    order_side, self.contract.symbol, self.timeframe, e
                ));
                return Err(e);
            }
        };

        if status.state == OrderState::Rejected {
            self.logs.push(format!(
                "{} order on {} {} rejected by {}",
                order_side,
                self.contract.symbol,
                self.timeframe,
                self.exchange.name()
            ));
            return Err(BotError::OrderRejected(status.order_id));
        }

        let filled = status.state == OrderState::Filled;
        let trade = Trade {
            id: Uuid::new_v4(),
            opened_at_ms: now_ms,
            entry_price: if filled { status.avg_fill_price } else { None },
            symbol: self.contract.symbol.clone(),
            strategy_name: self.strategy_name.clone(),
            side,
            status: TradeStatus::Open,
            pnl: Decimal::ZERO,
            quantity: if filled && status.executed_qty > Decimal::ZERO {
                status.executed_qty
            } else {
                quantity
            },
            entry_order_id: status.order_id.clone(),
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            exit_price: None,
            closed_at_ms: None,
            exit_reason: None,
        };
        let trade_id = trade.id;
        lock_book(&self.book).insert(trade)?;

        self.logs.push(format!(
            "{} order placed on {} | Status: {}",
            order_side,
            self.exchange.name(),
            status.state
        ));

        // Filled without a price still needs the tracker to learn the entry
        if !filled || status.avg_fill_price.is_none() {
            self.tracker.track(status.order_id, trade_id);
        }

        Ok(Some(trade_id))
    }

    /// Place the exit order for a filled trade and close it
    ///
    /// On any failure the trade stays open so the next tick retries.
    pub async fn close(
        &self,
        trade_id: Uuid,
        reason: ExitReason,
        trigger_price: Decimal,
        now_ms: i64,
    ) -> Result<Decimal> {
        let trade = lock_book(&self.book)
            .get(trade_id)
            .filter(|t| t.is_live())
            .cloned()
            .ok_or_else(|| BotError::OrderRejected(format!("trade {} is not open", trade_id)))?;

        let order_side = trade.side.exit_order_side();
        let mut quantity = trade.quantity;

        if self.exchange.market_kind() == MarketKind::Spot && order_side == OrderSide::Sell {
            let balances = self.exchange.get_balances().await?;
            let free = Self::free_balance(&balances, &self.contract.base_asset);
            if free < quantity {
                quantity = floor_to_lot(free, self.contract.lot_size);
                tracing::debug!(
                    symbol = %self.contract.symbol,
                    wanted = %trade.quantity,
                    clamped = %quantity,
                    "Exit quantity clamped to free balance"
                );
            }
            if quantity <= Decimal::ZERO {
                return Err(BotError::SizingUnavailable(format!(
                    "no free {} to sell",
                    self.contract.base_asset
                )));
            }
        }

        let status = match self
            .exchange
            .place_order(&self.contract, OrderType::Market, quantity, order_side)
            .await
        {
            Ok(status) if status.state != OrderState::Rejected => status,
            Ok(status) => {
                self.logs.push(format!(
                    "Exit order on {} {} rejected, retrying on next tick",
                    self.contract.symbol, self.timeframe
                ));
                return Err(BotError::OrderRejected(status.order_id));
            }
            Err(e) => {
                self.logs.push(format!(
                    "Exit order on {} {} failed: {}",
                    self.contract.symbol, self.timeframe, e
                ));
                return Err(e);
            }
        };

        let exit_price = match (status.state, status.avg_fill_price) {
            (OrderState::Filled, Some(price)) => price,
            _ => trigger_price,
        };

        let pnl = lock_book(&self.book)
            .close(trade_id, exit_price, quantity, reason, now_ms)
            .ok_or_else(|| BotError::OrderRejected(format!("trade {} closed elsewhere", trade_id)))?;

        self.logs.push(format!(
            "Exit order on {} {} placed successfully",
            self.contract.symbol, self.timeframe
        ));
        let label = match reason {
            ExitReason::StopLoss => "Stop loss",
            ExitReason::TakeProfit => "Take profit",
            ExitReason::EntryRejected => "Rejected entry",
        };
        self.logs.push(format!(
            "{} triggered for {} {} | PnL: {}",
            label,
            self.contract.symbol,
            self.timeframe,
            pnl.round_dp(2)
        ));

        Ok(pnl)
    }
}
