use candlebot::execution::{ActivationConfig, Engine, EngineSettings};
use candlebot::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

const MIN: i64 = 60_000;

fn contract(symbol: &str, base: &str) -> Contract {
    Contract {
        symbol: symbol.to_string(),
        base_asset: base.to_string(),
        quote_asset: "USDT".to_string(),
        lot_size: Decimal::new(1, 3),
    }
}

fn flat_history(price: i64, count: i64) -> Vec<Candle> {
    (0..count)
        .map(|i| Candle::from_trade(i * MIN, Decimal::from(price), Decimal::ONE))
        .collect()
}

fn create_exchange(market: MarketKind) -> Arc<PaperExchange> {
    let exchange = Arc::new(
        PaperExchange::new(market)
            .with_contract(contract("BTCUSDT", "BTC"))
            .with_contract(contract("ETHUSDT", "ETH")),
    );
    exchange.set_balance("USDT", Decimal::from(10_000));
    exchange.set_history("BTCUSDT", Timeframe::M1, flat_history(100, 3));
    exchange
}

fn create_engine(exchange: &Arc<PaperExchange>) -> Engine {
    Engine::new(exchange.clone(), EngineSettings::default())
}

fn config(strategy: StrategyVariant, params: StrategyParams) -> ActivationConfig {
    ActivationConfig {
        strategy,
        symbol: "BTCUSDT".to_string(),
        timeframe: Timeframe::M1,
        parameters: params,
    }
}

fn dummy() -> ActivationConfig {
    config(
        StrategyVariant::Dummy,
        StrategyParams::new().with("balance_pct", 10.0),
    )
}

fn breakout() -> ActivationConfig {
    config(
        StrategyVariant::Breakout,
        StrategyParams::new()
            .with("min_volume", 0.5)
            .with("balance_pct", 10.0),
    )
}

/// Mark the paper price and wait until the tick is processed
async fn deliver(engine: &Engine, exchange: &PaperExchange, price: i64, timestamp_ms: i64) {
    let tick = Tick {
        symbol: "BTCUSDT".to_string(),
        price: Decimal::from(price),
        size: Decimal::ONE,
        timestamp_ms,
    };
    exchange.mark_price(&tick.symbol, tick.price);
    engine.dispatch_tick(tick).await;
    engine.flush().await;
}

fn messages(engine: &Engine) -> Vec<String> {
    engine.drain_logs().into_iter().map(|e| e.message).collect()
}

#[tokio::test]
async fn test_dummy_opens_sized_position_on_new_candle() {
    let exchange = create_exchange(MarketKind::Spot);
    let engine = create_engine(&exchange);
    let id = engine.activate(dummy()).await.unwrap();

    deliver(&engine, &exchange, 100, 3 * MIN).await;

    let trades = engine.trades(id).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, Decimal::from(10));
    assert_eq!(trades[0].entry_price, Some(Decimal::from(100)));
    assert_eq!(trades[0].strategy_name, "Dummy");
    assert!(engine.ongoing_position(id).unwrap());

    let logs = messages(&engine);
    assert!(logs.contains(&"Long signal on BTCUSDT 1m".to_string()));
    assert!(logs.contains(&"Buy order placed on Paper | Status: filled".to_string()));

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pending_entry_filled_by_later_poll() {
    let exchange = create_exchange(MarketKind::Spot);
    exchange.set_fill_mode(FillMode::AfterPolls { polls: 1 });
    let engine = create_engine(&exchange);
    let id = engine.activate(dummy()).await.unwrap();

    deliver(&engine, &exchange, 100, 3 * MIN).await;

    let trades = engine.trades(id).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].entry_price, None);
    assert!(engine.ongoing_position(id).unwrap());
    assert_eq!(engine.pending_orders(id).unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(engine.trades(id).unwrap()[0].entry_price, None);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        engine.trades(id).unwrap()[0].entry_price,
        Some(Decimal::from(100))
    );
    assert_eq!(engine.pending_orders(id).unwrap(), 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_spot_short_signal_places_nothing() {
    let exchange = create_exchange(MarketKind::Spot);
    let engine = create_engine(&exchange);
    let id = engine.activate(breakout()).await.unwrap();

    // Close below the previous low
    deliver(&engine, &exchange, 95, 3 * MIN).await;

    assert!(engine.trades(id).unwrap().is_empty());
    assert!(exchange.placed_orders().is_empty());
    assert!(!engine.ongoing_position(id).unwrap());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_futures_short_signal_opens_short() {
    let exchange = create_exchange(MarketKind::Futures);
    let engine = create_engine(&exchange);
    let id = engine.activate(breakout()).await.unwrap();

    deliver(&engine, &exchange, 95, 3 * MIN).await;

    let trades = engine.trades(id).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].side, TradeSide::Short);
    // 1% above / 2% below the 95 entry
    assert_eq!(trades[0].stop_loss, Some(Decimal::new(9595, 2)));
    assert_eq!(trades[0].take_profit, Some(Decimal::new(9310, 2)));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_missing_parameter_refuses_activation() {
    let exchange = create_exchange(MarketKind::Spot);
    let engine = create_engine(&exchange);

    let result = engine
        .activate(config(
            StrategyVariant::Technical,
            StrategyParams::new()
                .with("rsi_length", 14.0)
                .with("balance_pct", 10.0),
        ))
        .await;

    assert!(matches!(result, Err(BotError::MissingParameter(ref name)) if name == "ema_fast"));
    assert!(engine.activation_ids().is_empty());
    assert!(exchange.subscriptions().is_empty());
    assert_eq!(
        messages(&engine),
        vec!["Technical strategy on BTCUSDT / 1m not started: Missing ema_fast parameter".to_string()]
    );
}

#[tokio::test]
async fn test_no_history_refuses_activation() {
    let exchange = create_exchange(MarketKind::Spot);
    let engine = create_engine(&exchange);

    let mut eth = dummy();
    eth.symbol = "ETHUSDT".to_string();

    assert!(matches!(
        engine.activate(eth).await,
        Err(BotError::NoHistoricalData(_))
    ));
    assert!(engine.activation_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_stops_order_polling() {
    let exchange = create_exchange(MarketKind::Spot);
    exchange.set_fill_mode(FillMode::AfterPolls { polls: 1 });
    let engine = create_engine(&exchange);
    let id = engine.activate(dummy()).await.unwrap();

    deliver(&engine, &exchange, 100, 3 * MIN).await;
    assert_eq!(exchange.placed_orders().len(), 1);

    engine.deactivate(id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Never polled, so the paper order never settled
    assert_eq!(
        exchange.balance("USDT").map(|b| b.available()),
        Some(Decimal::from(10_000))
    );
    assert!(engine.trades(id).is_err());

    // Further ticks go nowhere
    deliver(&engine, &exchange, 100, 4 * MIN).await;
    assert_eq!(exchange.placed_orders().len(), 1);
}

#[tokio::test]
async fn test_failed_exit_retried_on_next_tick() {
    let exchange = create_exchange(MarketKind::Futures);
    let engine = create_engine(&exchange);
    let id = engine.activate(breakout()).await.unwrap();

    deliver(&engine, &exchange, 105, 3 * MIN).await;
    let trades = engine.trades(id).unwrap();
    assert_eq!(trades[0].quantity, Decimal::new(9523, 3));

    exchange.fail_next_placements(1);
    deliver(&engine, &exchange, 108, 3 * MIN + 10_000).await;
    assert!(engine.ongoing_position(id).unwrap());

    deliver(&engine, &exchange, 108, 3 * MIN + 20_000).await;
    let trades = engine.trades(id).unwrap();
    assert!(!engine.ongoing_position(id).unwrap());
    assert_eq!(trades[0].status, TradeStatus::Closed);
    assert_eq!(trades[0].exit_reason, Some(ExitReason::TakeProfit));
    assert_eq!(trades[0].pnl, Decimal::new(28569, 3));

    let logs = messages(&engine);
    assert!(logs.contains(&"Exit order on BTCUSDT 1m placed successfully".to_string()));
    assert!(logs
        .iter()
        .any(|m| m.starts_with("Take profit triggered for BTCUSDT 1m")));

    let summary = engine.performance(id).unwrap();
    assert_eq!(summary.total_trades, 1);
    assert_eq!(summary.winning_trades, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_candle_gaps_filled_across_ticks() {
    let exchange = create_exchange(MarketKind::Spot);
    let engine = create_engine(&exchange);
    let id = engine
        .activate(config(
            StrategyVariant::Breakout,
            StrategyParams::new()
                .with("min_volume", 1_000.0)
                .with("balance_pct", 10.0),
        ))
        .await
        .unwrap();

    // Last history candle starts at 2m; next trade lands in the 6m interval
    deliver(&engine, &exchange, 101, 6 * MIN + 5_000).await;

    let candles = engine.candles(id).unwrap();
    assert_eq!(candles.len(), 7);
    for pair in candles.windows(2) {
        assert_eq!(pair[1].timestamp_ms - pair[0].timestamp_ms, MIN);
    }
    assert_eq!(candles[3].close, Decimal::from(100));
    assert_eq!(candles[3].volume, Decimal::ZERO);
    assert_eq!(candles[6].close, Decimal::from(101));

    engine.shutdown().await;
}
