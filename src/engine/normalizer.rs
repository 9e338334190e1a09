//! Raw transaction -> priced, currency-typed transaction.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::{
    Currency, InstrumentKind, Money, MoneyError, NormalizedTransaction, RawTransaction, Side,
};
use crate::error::EngineError;

/// Normalize a single raw transaction.
///
/// Pure and idempotent: the same input always yields an identical output.
///
/// # Errors
/// Per-transaction validation failures (currency, kind, side, price,
/// quantity, fees). Callers reject the row and continue the batch.
pub fn normalize(raw: &RawTransaction) -> Result<NormalizedTransaction, EngineError> {
    let txn_id = &raw.id;
    let currency = Currency::from_str(&raw.currency).map_err(|e| EngineError::at(txn_id, e))?;
    let kind = InstrumentKind::from_str(&raw.instrument_kind).map_err(|kind| {
        EngineError::UnknownInstrumentKind {
            txn_id: txn_id.clone(),
            kind,
        }
    })?;

    if raw.fees < Decimal::ZERO {
        return Err(EngineError::InvalidFees {
            txn_id: txn_id.clone(),
        });
    }
    let fees = Money::new(raw.fees, currency);
    let strike = raw.strike.map(|s| Money::new(s, currency));

    let (side, price, total_value) = match kind {
        InstrumentKind::Cash => {
            if raw.qty.is_zero() {
                return Err(EngineError::InvalidQuantity {
                    txn_id: txn_id.clone(),
                    reason: "cash movement of zero".to_string(),
                });
            }
            let price = Money::new(Decimal::ONE, currency);
            let total_value = price
                .try_mul(raw.qty)
                .map_err(|e| EngineError::at(txn_id, e))?;
            (None, price, total_value)
        }
        InstrumentKind::Shares | InstrumentKind::Call | InstrumentKind::Put => {
            let side = parse_side(raw, kind)?;
            let unit_price = raw.price.ok_or_else(|| EngineError::MissingPrice {
                txn_id: txn_id.clone(),
                kind: kind.to_string(),
            })?;
            if raw.qty <= Decimal::ZERO {
                return Err(EngineError::InvalidQuantity {
                    txn_id: txn_id.clone(),
                    reason: format!("{} quantity must be positive, got {}", kind, raw.qty),
                });
            }
            let price = Money::new(unit_price, currency);
            let total_value = trade_cash_effect(&price, raw.qty, kind, side, &fees)
                .map_err(|e| EngineError::at(txn_id, e))?;
            (Some(side), price, total_value)
        }
    };

    Ok(NormalizedTransaction {
        id: raw.id.clone(),
        user_id: raw.user_id.clone(),
        account_id: raw.account_id.clone(),
        timestamp: raw.timestamp,
        instrument_kind: kind,
        ticker: raw.ticker.clone(),
        expiry: raw.expiry,
        strike,
        side,
        qty: raw.qty,
        price,
        fees,
        currency,
        memo: raw.memo.clone(),
        total_value,
    })
}

/// Normalize every transaction independently, preserving input order.
pub fn normalize_batch(raws: &[RawTransaction]) -> Vec<Result<NormalizedTransaction, EngineError>> {
    raws.iter().map(normalize).collect()
}

fn parse_side(raw: &RawTransaction, kind: InstrumentKind) -> Result<Side, EngineError> {
    let side = raw.side.as_deref().ok_or_else(|| EngineError::MissingSide {
        txn_id: raw.id.clone(),
        kind: kind.to_string(),
    })?;
    Side::from_str(side).map_err(|side| EngineError::UnknownSide {
        txn_id: raw.id.clone(),
        side,
    })
}

/// Signed cash effect of a trade: `gross * cash_sign - fees`.
///
/// Fees always reduce cash, whichever direction the trade goes.
fn trade_cash_effect(
    price: &Money,
    qty: Decimal,
    kind: InstrumentKind,
    side: Side,
    fees: &Money,
) -> Result<Money, MoneyError> {
    let units = qty
        .checked_mul(Decimal::from(kind.multiplier()))
        .ok_or_else(|| MoneyError::InvalidMagnitude(format!("{} contracts of {}", qty, kind)))?;
    let gross = price.try_mul(units)?;
    let directed = gross.try_mul(Decimal::from(side.cash_sign()))?;
    directed.try_sub(fees)
}
