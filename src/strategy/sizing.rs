use rust_decimal::Decimal;

use crate::error::BotError;
use crate::Result;

/// Quantities are reported with at most this many decimals
const QUANTITY_DP: u32 = 8;

/// Round a quantity down to a whole number of lots
pub fn floor_to_lot(quantity: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size <= Decimal::ZERO {
        return quantity.round_dp(QUANTITY_DP).normalize();
    }

    let lots = (quantity / lot_size).floor();
    (lots * lot_size).round_dp(QUANTITY_DP).normalize()
}

/// Spend `balance_pct` percent of the balance at `price`
pub fn balance_pct_size(
    balance: Decimal,
    balance_pct: Decimal,
    price: Decimal,
    lot_size: Decimal,
) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(BotError::SizingUnavailable(format!("invalid price {}", price)));
    }

    let notional = balance * balance_pct / Decimal::ONE_HUNDRED;
    non_zero(floor_to_lot(notional / price, lot_size))
}

/// Risk `risk_pct` percent of the balance on the distance to the stop
pub fn risk_size(
    balance: Decimal,
    risk_pct: Decimal,
    price: Decimal,
    stop_loss: Decimal,
    lot_size: Decimal,
) -> Result<Decimal> {
    let distance = (price - stop_loss).abs();
    if distance.is_zero() {
        return Err(BotError::SizingUnavailable(
            "stop loss equals entry price".to_string(),
        ));
    }

    let risk_amount = balance * risk_pct / Decimal::ONE_HUNDRED;
    non_zero(floor_to_lot(risk_amount / distance, lot_size))
}

fn non_zero(size: Decimal) -> Result<Decimal> {
    if size <= Decimal::ZERO {
        return Err(BotError::SizingUnavailable(
            "balance below one lot".to_string(),
        ));
    }
    Ok(size)
}
