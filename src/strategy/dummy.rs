use rust_decimal::Decimal;

use super::StrategyParams;
use crate::models::{Candle, Signal};
use crate::Result;

/// Always goes long; exercises the order pipeline end to end
#[derive(Debug, Clone)]
pub struct DummyStrategy {
    pub balance_pct: Decimal,
}

impl DummyStrategy {
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            balance_pct: params.decimal("balance_pct")?,
        })
    }

    pub fn evaluate_signal(&self, _candles: &[Candle]) -> Signal {
        Signal::Buy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{StrategyKind, StrategyVariant};
    use crate::models::TradeSide;

    #[test]
    fn test_always_buys() {
        let strategy = DummyStrategy::from_params(&StrategyParams::new().with("balance_pct", 10.0))
            .unwrap();
        assert_eq!(strategy.evaluate_signal(&[]), Signal::Buy);
    }

    #[test]
    fn test_dummy_trade_size() {
        let kind = StrategyKind::from_params(
            StrategyVariant::Dummy,
            &StrategyParams::new().with("balance_pct", 10.0),
        )
        .unwrap();

        let size = kind
            .size_trade(
                TradeSide::Long,
                Decimal::ONE_HUNDRED,
                Decimal::from(10_000),
                Decimal::new(1, 3),
            )
            .unwrap();
        assert_eq!(size, Decimal::TEN);
    }

    #[test]
    fn test_no_exit_levels() {
        let kind = StrategyKind::from_params(
            StrategyVariant::Dummy,
            &StrategyParams::new().with("balance_pct", 10.0),
        )
        .unwrap();
        let levels = kind.entry_levels(TradeSide::Long, Decimal::ONE_HUNDRED);
        assert!(levels.stop_loss.is_none() && levels.take_profit.is_none());
    }
}
