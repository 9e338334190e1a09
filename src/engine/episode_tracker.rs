use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::{InstrumentKind, Money, MoneyError, NormalizedTransaction, Side};
use crate::error::EngineError;

use super::aggregator::RollDetection;
use super::{ActionTerm, EpisodeTxn, PositionEpisode};

/// Current state of a position for one (account, episode key).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PositionState {
    /// Shares: >= 0. Options: positive = long, negative = short.
    pub qty: Decimal,

    /// Fee-inclusive average entry price (only meaningful when qty != 0).
    pub avg_price: Option<Money>,

    /// Live episode (None if flat).
    pub episode_id: Option<u64>,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        self.qty.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.qty > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.qty < Decimal::ZERO
    }
}

/// Sequential episode id source shared by every tracker in a run.
#[derive(Debug, Clone)]
pub struct EpisodeIds {
    next: u64,
}

impl EpisodeIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for EpisodeIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Option contract leg: (expiry, strike).
type Leg = (NaiveDate, Money);

struct OpenEpisode {
    episode: PositionEpisode,
    /// Full-precision average entry price; `episode.avg_price` is its
    /// rounded view.
    avg_entry: Decimal,
}

/// An option episode closed to zero that may still turn out to be the first
/// half of a roll.
struct PendingClose {
    episode: PositionEpisode,
    opened_with: Side,
}

impl OpenEpisode {
    fn start(txn: &NormalizedTransaction, id: u64, episode_key: String) -> Self {
        let zero = Money::zero(txn.currency);
        OpenEpisode {
            episode: PositionEpisode {
                id,
                account_id: txn.account_id.clone(),
                episode_key,
                instrument_kind: txn.instrument_kind,
                ticker: txn.ticker.clone(),
                open_timestamp: txn.timestamp,
                close_timestamp: None,
                qty: Decimal::ZERO,
                avg_price: zero,
                total_fees: zero,
                cash_total: zero,
                realized_pnl_total: zero,
                rolled: false,
                current_instrument_key: None,
                current_strike: None,
                current_expiry: None,
                txns: Vec::new(),
            },
            avg_entry: Decimal::ZERO,
        }
    }

    /// Increase |qty| by `qty`, folding the fee-inclusive entry price into the
    /// weighted average.
    fn add(
        &mut self,
        txn: &NormalizedTransaction,
        side: Side,
        qty: Decimal,
        fees: Money,
        cash_value: Money,
    ) -> Result<(), EngineError> {
        let at = |e: MoneyError| EngineError::at(&txn.id, e);
        let entry = entry_price(txn, side, qty, &fees)?;

        let ep = &mut self.episode;
        let old_abs = ep.qty.abs();
        let new_abs = old_abs
            .checked_add(qty)
            .ok_or_else(|| overflow(txn, "position quantity"))?;

        self.avg_entry = if old_abs.is_zero() {
            entry
        } else {
            self.avg_entry
                .checked_mul(old_abs)
                .zip(entry.checked_mul(qty))
                .and_then(|(held, added)| held.checked_add(added))
                .and_then(|total| total.checked_div(new_abs))
                .ok_or_else(|| overflow(txn, "average entry price"))?
        };
        ep.avg_price = Money::new(self.avg_entry, txn.currency);

        let qty_delta = signed_qty(txn, qty, side)?;
        ep.qty = ep
            .qty
            .checked_add(qty_delta)
            .ok_or_else(|| overflow(txn, "position quantity"))?;
        ep.total_fees = ep.total_fees.try_add(&fees).map_err(at)?;
        ep.cash_total = ep.cash_total.try_add(&cash_value).map_err(at)?;
        ep.current_instrument_key = txn.instrument_key();
        ep.current_strike = txn.strike;
        ep.current_expiry = txn.expiry;

        ep.txns.push(EpisodeTxn {
            txn_id: txn.id.clone(),
            timestamp: txn.timestamp,
            action_term: ActionTerm::for_trade(txn.instrument_kind, side, true),
            qty_delta,
            qty_after: ep.qty,
            price: txn.price,
            fees,
            cash_value,
            realized_pnl_delta: Money::zero(txn.currency),
            strike: txn.strike,
            expiry: txn.expiry,
        });
        Ok(())
    }

    /// Decrease |qty| by `qty` and realize P&L on the reduced quantity.
    ///
    /// Realized = (exit - avg) * qty * multiplier * direction - exit fees.
    /// Entry fees are already inside `avg`.
    fn reduce(
        &mut self,
        txn: &NormalizedTransaction,
        side: Side,
        qty: Decimal,
        fees: Money,
        cash_value: Money,
    ) -> Result<Money, EngineError> {
        let at = |e: MoneyError| EngineError::at(&txn.id, e);
        let ep = &mut self.episode;
        let direction = if ep.qty > Decimal::ZERO {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        let units = qty
            .checked_mul(Decimal::from(txn.instrument_kind.multiplier()))
            .and_then(|u| u.checked_mul(direction))
            .ok_or_else(|| overflow(txn, "contract units"))?;
        let gross = txn
            .price
            .amount()
            .checked_sub(self.avg_entry)
            .and_then(|diff| diff.checked_mul(units))
            .ok_or_else(|| overflow(txn, "realized P&L"))?;
        let realized = Money::new(gross, txn.currency)
            .try_sub(&fees)
            .map_err(at)?;

        let qty_delta = signed_qty(txn, qty, side)?;
        ep.qty = ep
            .qty
            .checked_add(qty_delta)
            .ok_or_else(|| overflow(txn, "position quantity"))?;
        ep.total_fees = ep.total_fees.try_add(&fees).map_err(at)?;
        ep.cash_total = ep.cash_total.try_add(&cash_value).map_err(at)?;
        ep.realized_pnl_total = ep.realized_pnl_total.try_add(&realized).map_err(at)?;

        ep.txns.push(EpisodeTxn {
            txn_id: txn.id.clone(),
            timestamp: txn.timestamp,
            action_term: ActionTerm::for_trade(txn.instrument_kind, side, false),
            qty_delta,
            qty_after: ep.qty,
            price: txn.price,
            fees,
            cash_value,
            realized_pnl_delta: realized,
            strike: txn.strike,
            expiry: txn.expiry,
        });
        Ok(realized)
    }
}

/// Position state machine for one (account, episode key).
///
/// Callers must feed transactions in (timestamp, id) order. A closing option
/// trade is held as a pending close until the next transaction shows whether
/// it was the first half of a roll.
pub struct EpisodeTracker {
    open: Option<OpenEpisode>,
    pending_close: Option<PendingClose>,
    done: Vec<PositionEpisode>,
}

impl EpisodeTracker {
    pub fn new() -> Self {
        Self {
            open: None,
            pending_close: None,
            done: Vec::new(),
        }
    }

    pub fn state(&self) -> PositionState {
        match &self.open {
            Some(open) => PositionState {
                qty: open.episode.qty,
                avg_price: Some(open.episode.avg_price),
                episode_id: Some(open.episode.id),
            },
            None => PositionState::default(),
        }
    }

    /// Process one SHARES/CALL/PUT transaction.
    ///
    /// # Errors
    /// Missing side or option fields, currency mixing within an episode,
    /// arithmetic overflow, and SHARES quantity going negative are all fatal.
    pub fn process(
        &mut self,
        txn: &NormalizedTransaction,
        ids: &mut EpisodeIds,
        roll: &RollDetection,
    ) -> Result<(), EngineError> {
        let side = trade_side(txn)?;
        let leg = option_leg(txn)?;

        if let Some(pending) = self.pending_close.take() {
            if is_roll(&pending, txn, side, leg, roll) {
                tracing::debug!(
                    episode_id = pending.episode.id,
                    txn_id = %txn.id,
                    from = ?pending.episode.current_instrument_key,
                    to = ?txn.instrument_key(),
                    "Roll detected"
                );
                return self.handle_roll(pending.episode, txn, side);
            }
            self.done.push(pending.episode);
        }

        if let Some(open) = &self.open {
            let expected = open.episode.currency();
            if expected != txn.currency {
                return Err(EngineError::at(
                    &txn.id,
                    MoneyError::CurrencyMismatch {
                        expected,
                        found: txn.currency,
                    },
                ));
            }
        }

        let old_qty = self.state().qty;
        let new_qty = signed_qty(txn, txn.qty, side)?
            .checked_add(old_qty)
            .ok_or_else(|| overflow(txn, "position quantity"))?;

        match txn.instrument_kind {
            InstrumentKind::Shares => {
                if new_qty < Decimal::ZERO {
                    return Err(EngineError::AggregationInvariantViolation {
                        txn_id: txn.id.clone(),
                        reason: format!(
                            "share quantity would go negative ({} -> {})",
                            old_qty, new_qty
                        ),
                    });
                }
            }
            // Cash never gets here: trade_side refuses it.
            InstrumentKind::Call | InstrumentKind::Put | InstrumentKind::Cash => {}
        }

        if is_flip(old_qty, new_qty) {
            self.handle_flip(txn, side, old_qty, new_qty, ids)
        } else if old_qty.is_zero() {
            self.handle_open(txn, side, ids)
        } else if new_qty.is_zero() {
            self.handle_close(txn, side, roll)
        } else {
            self.handle_adjustment(txn, side, old_qty, new_qty)
        }
    }

    /// Open a new episode from flat.
    fn handle_open(
        &mut self,
        txn: &NormalizedTransaction,
        side: Side,
        ids: &mut EpisodeIds,
    ) -> Result<(), EngineError> {
        let key = episode_key(txn)?;
        let mut open = OpenEpisode::start(txn, ids.next_id(), key);
        open.add(txn, side, txn.qty, txn.fees, txn.total_value)?;
        self.open = Some(open);
        Ok(())
    }

    /// Close the live episode to flat.
    fn handle_close(
        &mut self,
        txn: &NormalizedTransaction,
        side: Side,
        roll: &RollDetection,
    ) -> Result<(), EngineError> {
        let mut open = self.take_open(txn)?;
        open.reduce(txn, side, txn.qty, txn.fees, txn.total_value)?;

        let mut episode = open.episode;
        episode.close_timestamp = Some(txn.timestamp);

        if roll.enabled && txn.instrument_kind.is_option() {
            self.pending_close = Some(PendingClose {
                episode,
                opened_with: side.opposite(),
            });
        } else {
            self.done.push(episode);
        }
        Ok(())
    }

    /// Handle a flip (long to short or short to long). Only options can flip.
    fn handle_flip(
        &mut self,
        txn: &NormalizedTransaction,
        side: Side,
        old_qty: Decimal,
        new_qty: Decimal,
        ids: &mut EpisodeIds,
    ) -> Result<(), EngineError> {
        let at = |e: MoneyError| EngineError::at(&txn.id, e);
        let close_qty = old_qty.abs();
        let open_qty = new_qty.abs();

        let close_fees = txn.fees.try_mul(close_qty).and_then(|m| m.try_div(txn.qty)).map_err(at)?;
        let open_fees = txn.fees.try_sub(&close_fees).map_err(at)?;
        let close_cash = txn
            .total_value
            .try_mul(close_qty)
            .and_then(|m| m.try_div(txn.qty))
            .map_err(at)?;
        let open_cash = txn.total_value.try_sub(&close_cash).map_err(at)?;

        let mut closing = self.take_open(txn)?;
        closing.reduce(txn, side, close_qty, close_fees, close_cash)?;
        let mut closed = closing.episode;
        closed.close_timestamp = Some(txn.timestamp);
        self.done.push(closed);

        let key = episode_key(txn)?;
        let mut opening = OpenEpisode::start(txn, ids.next_id(), key);
        opening.add(txn, side, open_qty, open_fees, open_cash)?;
        self.open = Some(opening);
        Ok(())
    }

    /// Increase or decrease without flip/flat.
    fn handle_adjustment(
        &mut self,
        txn: &NormalizedTransaction,
        side: Side,
        old_qty: Decimal,
        new_qty: Decimal,
    ) -> Result<(), EngineError> {
        let open = self.open.as_mut().ok_or_else(|| no_open_episode(txn))?;
        if new_qty.abs() > old_qty.abs() {
            open.add(txn, side, txn.qty, txn.fees, txn.total_value)
        } else {
            open.reduce(txn, side, txn.qty, txn.fees, txn.total_value)
                .map(|_| ())
        }
    }

    /// Fold the reopening leg of a roll into the pending episode.
    fn handle_roll(
        &mut self,
        pending: PositionEpisode,
        txn: &NormalizedTransaction,
        side: Side,
    ) -> Result<(), EngineError> {
        let mut episode = pending;
        episode.close_timestamp = None;
        episode.rolled = true;
        let mut open = OpenEpisode {
            episode,
            avg_entry: Decimal::ZERO,
        };
        open.add(txn, side, txn.qty, txn.fees, txn.total_value)?;
        self.open = Some(open);
        Ok(())
    }

    fn take_open(&mut self, txn: &NormalizedTransaction) -> Result<OpenEpisode, EngineError> {
        self.open.take().ok_or_else(|| no_open_episode(txn))
    }

    /// Emit every episode, closed and still open, in creation order.
    pub fn into_episodes(mut self) -> Vec<PositionEpisode> {
        if let Some(pending) = self.pending_close.take() {
            self.done.push(pending.episode);
        }
        if let Some(open) = self.open.take() {
            self.done.push(open.episode);
        }
        self.done.sort_by_key(|e| e.id);
        self.done
    }
}

impl Default for EpisodeTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn is_flip(old_qty: Decimal, new_qty: Decimal) -> bool {
    if old_qty.is_zero() || new_qty.is_zero() {
        return false;
    }
    (old_qty > Decimal::ZERO) != (new_qty > Decimal::ZERO)
}

/// A roll reopens a different leg in the same direction as the episode that
/// was just closed (STO, BTC, STO or BTO, STC, BTO), within the configured
/// window.
fn is_roll(
    pending: &PendingClose,
    txn: &NormalizedTransaction,
    side: Side,
    leg: Option<Leg>,
    roll: &RollDetection,
) -> bool {
    let Some((expiry, strike)) = leg else {
        return false;
    };
    let episode = &pending.episode;
    let Some(closed_at) = episode.close_timestamp else {
        return false;
    };
    let same_leg = episode.current_expiry == Some(expiry) && episode.current_strike == Some(strike);
    roll.enabled
        && side == pending.opened_with
        && episode.currency() == txn.currency
        && !same_leg
        && txn.timestamp - closed_at <= roll.max_gap
}

/// Per-unit entry price with this event's fees folded in. Fees raise a long's
/// cost basis and lower a short's proceeds.
fn entry_price(
    txn: &NormalizedTransaction,
    side: Side,
    qty: Decimal,
    fees: &Money,
) -> Result<Decimal, EngineError> {
    let units = qty
        .checked_mul(Decimal::from(txn.instrument_kind.multiplier()))
        .ok_or_else(|| overflow(txn, "contract units"))?;
    let fee_per_unit = fees
        .amount()
        .checked_div(units)
        .ok_or_else(|| overflow(txn, "fee per unit"))?;
    let price = txn.price.amount();
    match side {
        Side::Buy => price.checked_add(fee_per_unit),
        Side::Sell => price.checked_sub(fee_per_unit),
    }
    .ok_or_else(|| overflow(txn, "entry price"))
}

fn signed_qty(txn: &NormalizedTransaction, qty: Decimal, side: Side) -> Result<Decimal, EngineError> {
    qty.checked_mul(Decimal::from(side.sign()))
        .ok_or_else(|| overflow(txn, "position quantity"))
}

fn trade_side(txn: &NormalizedTransaction) -> Result<Side, EngineError> {
    match txn.instrument_kind {
        InstrumentKind::Cash => Err(EngineError::AggregationInvariantViolation {
            txn_id: txn.id.clone(),
            reason: "cash movement routed to a position tracker".to_string(),
        }),
        InstrumentKind::Shares | InstrumentKind::Call | InstrumentKind::Put => {
            txn.side.ok_or_else(|| EngineError::AggregationInvariantViolation {
                txn_id: txn.id.clone(),
                reason: format!("{} transaction has no side", txn.instrument_kind),
            })
        }
    }
}

fn option_leg(txn: &NormalizedTransaction) -> Result<Option<Leg>, EngineError> {
    match txn.instrument_kind {
        InstrumentKind::Cash | InstrumentKind::Shares => Ok(None),
        InstrumentKind::Call | InstrumentKind::Put => {
            let expiry = txn.expiry.ok_or_else(|| EngineError::MissingOptionField {
                txn_id: txn.id.clone(),
                field: "expiry",
            })?;
            let strike = txn.strike.ok_or_else(|| EngineError::MissingOptionField {
                txn_id: txn.id.clone(),
                field: "strike",
            })?;
            Ok(Some((expiry, strike)))
        }
    }
}

fn episode_key(txn: &NormalizedTransaction) -> Result<String, EngineError> {
    txn.episode_key()
        .ok_or_else(|| EngineError::AggregationInvariantViolation {
            txn_id: txn.id.clone(),
            reason: format!("{} transaction has no ticker", txn.instrument_kind),
        })
}

fn no_open_episode(txn: &NormalizedTransaction) -> EngineError {
    EngineError::AggregationInvariantViolation {
        txn_id: txn.id.clone(),
        reason: "reducing trade without an open episode".to_string(),
    }
}

fn overflow(txn: &NormalizedTransaction, what: &str) -> EngineError {
    EngineError::AggregationInvariantViolation {
        txn_id: txn.id.clone(),
        reason: format!("{} out of range", what),
    }
}
