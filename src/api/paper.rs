use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::ExchangeClient;
use crate::error::BotError;
use crate::models::{
    Balance, Candle, Contract, MarketKind, OrderSide, OrderState, OrderStatus, OrderType,
    TickChannel, Timeframe,
};
use crate::Result;

/// How the paper exchange answers market orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FillMode {
    /// Filled in the placement response
    #[default]
    Immediate,
    /// Pending until the `polls`-th status query
    AfterPolls { polls: u32 },
    /// Accepted, then reported rejected on the first status query
    RejectLater,
}

/// Record of an order sent to the paper exchange
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    symbol: String,
    side: OrderSide,
    quantity: Decimal,
    state: OrderState,
    avg_price: Option<Decimal>,
    polls: u32,
    mode: FillMode,
}

#[derive(Debug, Default)]
struct PaperState {
    balances: HashMap<String, Balance>,
    last_prices: HashMap<String, Decimal>,
    history: HashMap<(String, Timeframe), Vec<Candle>>,
    orders: HashMap<String, PaperOrder>,
    placed: Vec<PlacedOrder>,
    subscriptions: Vec<(String, Vec<TickChannel>)>,
    fill_mode: FillMode,
    next_order_id: u64,
    failing_placements: u32,
    unknown_status_polls: u32,
    balances_unavailable: bool,
}

/// In-memory exchange that fills market orders at the last marked price
///
/// Spot balances move on fills; futures wallet balances are left untouched.
pub struct PaperExchange {
    market: MarketKind,
    contracts: HashMap<String, Contract>,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(market: MarketKind) -> Self {
        Self {
            market,
            contracts: HashMap::new(),
            state: Mutex::new(PaperState::default()),
        }
    }

    pub fn with_contract(mut self, contract: Contract) -> Self {
        self.contracts.insert(contract.symbol.clone(), contract);
        self
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        let balance = match self.market {
            MarketKind::Spot => Balance::Spot {
                free: amount,
                locked: Decimal::ZERO,
            },
            MarketKind::Futures => Balance::Futures {
                wallet_balance: amount,
            },
        };
        self.lock().balances.insert(asset.to_string(), balance);
    }

    pub fn set_history(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        if let Some(last) = candles.last() {
            self.mark_price(symbol, last.close);
        }
        self.lock()
            .history
            .insert((symbol.to_string(), timeframe), candles);
    }

    /// Latest traded price; market orders fill here
    pub fn mark_price(&self, symbol: &str, price: Decimal) {
        self.lock().last_prices.insert(symbol.to_string(), price);
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        self.lock().fill_mode = mode;
    }

    /// Make the next `count` placements fail as if the exchange were unreachable
    ///
    /// Failed attempts are not recorded in [`PaperExchange::placed_orders`].
    pub fn fail_next_placements(&self, count: u32) {
        self.lock().failing_placements = count;
    }

    /// Answer the next `count` status queries with "unknown order"
    pub fn hide_next_statuses(&self, count: u32) {
        self.lock().unknown_status_polls = count;
    }

    pub fn set_balances_unavailable(&self, unavailable: bool) {
        self.lock().balances_unavailable = unavailable;
    }

    pub fn balance(&self, asset: &str) -> Option<Balance> {
        self.lock().balances.get(asset).cloned()
    }

    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.lock().placed.clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, Vec<TickChannel>)> {
        self.lock().subscriptions.clone()
    }

    fn contract_for(&self, symbol: &str) -> Result<&Contract> {
        self.contracts
            .get(symbol)
            .ok_or_else(|| BotError::UnknownContract(symbol.to_string()))
    }

    fn settle(&self, state: &mut PaperState, order_id: &str) {
        let Some(order) = state.orders.get(order_id).cloned() else {
            return;
        };
        let Some(price) = state.last_prices.get(&order.symbol).copied() else {
            return;
        };

        if let (MarketKind::Spot, Ok(contract)) = (self.market, self.contract_for(&order.symbol)) {
            let notional = price * order.quantity;
            let (quote_delta, base_delta) = match order.side {
                OrderSide::Buy => (-notional, order.quantity),
                OrderSide::Sell => (notional, -order.quantity),
            };
            adjust_free(&mut state.balances, &contract.quote_asset, quote_delta);
            adjust_free(&mut state.balances, &contract.base_asset, base_delta);
        }

        if let Some(order) = state.orders.get_mut(order_id) {
            order.state = OrderState::Filled;
            order.avg_price = Some(price);
        }
    }

    fn status_of(order_id: &str, order: &PaperOrder) -> OrderStatus {
        OrderStatus {
            order_id: order_id.to_string(),
            state: order.state,
            avg_fill_price: order.avg_price,
            executed_qty: if order.state == OrderState::Filled {
                order.quantity
            } else {
                Decimal::ZERO
            },
        }
    }

    fn has_funds(&self, state: &PaperState, contract: &Contract, side: OrderSide, qty: Decimal, price: Decimal) -> bool {
        if self.market == MarketKind::Futures {
            return true;
        }

        let free = |asset: &str| {
            state
                .balances
                .get(asset)
                .map(|b| b.available())
                .unwrap_or(Decimal::ZERO)
        };
        match side {
            OrderSide::Buy => free(&contract.quote_asset) >= qty * price,
            OrderSide::Sell => free(&contract.base_asset) >= qty,
        }
    }
}

fn adjust_free(balances: &mut HashMap<String, Balance>, asset: &str, delta: Decimal) {
    let entry = balances
        .entry(asset.to_string())
        .or_insert(Balance::Spot {
            free: Decimal::ZERO,
            locked: Decimal::ZERO,
        });
    if let Balance::Spot { free, .. } = entry {
        *free += delta;
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "Paper"
    }

    fn market_kind(&self) -> MarketKind {
        self.market
    }

    fn contract(&self, symbol: &str) -> Option<Contract> {
        self.contracts.get(symbol).cloned()
    }

    async fn get_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>> {
        Ok(self
            .lock()
            .history
            .get(&(contract.symbol.clone(), timeframe))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>> {
        let state = self.lock();
        if state.balances_unavailable {
            return Err(BotError::Exchange("balances unavailable".to_string()));
        }
        Ok(state.balances.clone())
    }

    async fn place_order(
        &self,
        contract: &Contract,
        _order_type: OrderType,
        quantity: Decimal,
        side: OrderSide,
    ) -> Result<OrderStatus> {
        let contract = self.contract_for(&contract.symbol)?.clone();
        let mut state = self.lock();

        if state.failing_placements > 0 {
            state.failing_placements -= 1;
            return Err(BotError::Exchange("paper exchange unreachable".to_string()));
        }

        let price = state
            .last_prices
            .get(&contract.symbol)
            .copied()
            .ok_or_else(|| BotError::Exchange(format!("no price for {}", contract.symbol)))?;

        state.next_order_id += 1;
        let order_id = state.next_order_id.to_string();
        let mode = state.fill_mode;

        let funded = self.has_funds(&state, &contract, side, quantity, price);
        state.orders.insert(
            order_id.clone(),
            PaperOrder {
                symbol: contract.symbol.clone(),
                side,
                quantity,
                state: if funded {
                    OrderState::Pending
                } else {
                    OrderState::Rejected
                },
                avg_price: None,
                polls: 0,
                mode,
            },
        );
        state.placed.push(PlacedOrder {
            order_id: order_id.clone(),
            symbol: contract.symbol.clone(),
            side,
            quantity,
        });

        if funded && mode == FillMode::Immediate {
            self.settle(&mut state, &order_id);
        }

        let order = &state.orders[&order_id];
        tracing::debug!(
            order_id = %order_id,
            side = %side,
            quantity = %quantity,
            state = %order.state,
            "Paper order placed"
        );
        Ok(Self::status_of(&order_id, order))
    }

    async fn get_order_status(
        &self,
        _contract: &Contract,
        order_id: &str,
    ) -> Result<Option<OrderStatus>> {
        let mut state = self.lock();

        if state.unknown_status_polls > 0 {
            state.unknown_status_polls -= 1;
            return Ok(None);
        }

        let Some(order) = state.orders.get_mut(order_id) else {
            return Ok(None);
        };

        if order.state == OrderState::Pending {
            order.polls += 1;
            match order.mode {
                FillMode::AfterPolls { polls } if order.polls >= polls => {
                    self.settle(&mut state, order_id);
                }
                FillMode::RejectLater => order.state = OrderState::Rejected,
                _ => {}
            }
        }

        Ok(state
            .orders
            .get(order_id)
            .map(|order| Self::status_of(order_id, order)))
    }

    async fn subscribe_ticks(&self, contract: &Contract, channels: &[TickChannel]) -> Result<()> {
        self.contract_for(&contract.symbol)?;
        self.lock()
            .subscriptions
            .push((contract.symbol.clone(), channels.to_vec()));
        Ok(())
    }
}
