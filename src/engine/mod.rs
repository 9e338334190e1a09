//! Pure computation engine(s) for deterministic ledger logic.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{AccountId, Currency, InstrumentKind, Money, Side, Ticker, Timestamp, TxnId};

pub mod aggregator;
pub mod episode_tracker;
pub mod ledger_builder;
pub mod normalizer;

pub use aggregator::{aggregate_episodes, AggregationConfig, EpisodeAggregator, RollDetection};
pub use episode_tracker::{EpisodeTracker, PositionState};
pub use ledger_builder::{build_ledger, LedgerBuilder, LedgerConfig};
pub use normalizer::{normalize, normalize_batch};

/// Running balances: account -> currency -> amount.
pub type Balances = BTreeMap<AccountId, BTreeMap<Currency, Money>>;

/// One row per transaction: its cash effect and the running balance after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub txn_id: TxnId,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    /// `None` only when the transaction's currency could not be read.
    pub currency: Option<Currency>,
    /// `None` when the transaction could not be priced.
    pub cash_delta: Option<Money>,
    pub balance_after: Option<Money>,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of the ledger builder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub rows: Vec<LedgerRow>,
    pub balances: Balances,
}

impl Ledger {
    pub fn accepted_rows(&self) -> impl Iterator<Item = &LedgerRow> {
        self.rows.iter().filter(|r| r.accepted)
    }

    pub fn accepted_ids(&self) -> std::collections::HashSet<TxnId> {
        self.accepted_rows().map(|r| r.txn_id.clone()).collect()
    }
}

/// Human term for what a transaction did to its episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionTerm {
    /// Buy to open.
    Bto,
    /// Sell to open.
    Sto,
    /// Buy to close.
    Btc,
    /// Sell to close.
    Stc,
    Buy,
    Sell,
    Deposit,
    Withdrawal,
}

impl ActionTerm {
    pub fn for_trade(kind: InstrumentKind, side: Side, opening: bool) -> Self {
        match (kind, side, opening) {
            (InstrumentKind::Call | InstrumentKind::Put, Side::Buy, true) => ActionTerm::Bto,
            (InstrumentKind::Call | InstrumentKind::Put, Side::Sell, true) => ActionTerm::Sto,
            (InstrumentKind::Call | InstrumentKind::Put, Side::Buy, false) => ActionTerm::Btc,
            (InstrumentKind::Call | InstrumentKind::Put, Side::Sell, false) => ActionTerm::Stc,
            (InstrumentKind::Cash | InstrumentKind::Shares, Side::Buy, _) => ActionTerm::Buy,
            (InstrumentKind::Cash | InstrumentKind::Shares, Side::Sell, _) => ActionTerm::Sell,
        }
    }

    pub fn for_cash(amount: &Money) -> Self {
        if amount.is_negative() {
            ActionTerm::Withdrawal
        } else {
            ActionTerm::Deposit
        }
    }
}

/// A transaction's contribution to an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeTxn {
    pub txn_id: TxnId,
    pub timestamp: Timestamp,
    pub action_term: ActionTerm,
    /// Signed change in episode quantity.
    pub qty_delta: Decimal,
    /// Episode quantity after this transaction.
    pub qty_after: Decimal,
    pub price: Money,
    pub fees: Money,
    pub cash_value: Money,
    pub realized_pnl_delta: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
}

/// A contiguous holding period for one (account, episode key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEpisode {
    pub id: u64,
    pub account_id: AccountId,
    /// `CASH`, `TICKER`, `TICKER|CALL` or `TICKER|PUT`.
    pub episode_key: String,
    pub instrument_kind: InstrumentKind,
    pub ticker: Option<Ticker>,
    pub open_timestamp: Timestamp,
    pub close_timestamp: Option<Timestamp>,
    /// Shares: >= 0. Options: long > 0, short < 0. Zero once closed.
    pub qty: Decimal,
    pub avg_price: Money,
    pub total_fees: Money,
    pub cash_total: Money,
    pub realized_pnl_total: Money,
    pub rolled: bool,
    pub current_instrument_key: Option<String>,
    pub current_strike: Option<Money>,
    pub current_expiry: Option<NaiveDate>,
    pub txns: Vec<EpisodeTxn>,
}

impl PositionEpisode {
    pub fn is_open(&self) -> bool {
        !self.qty.is_zero()
    }

    pub fn currency(&self) -> Currency {
        self.cash_total.currency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_terms() {
        assert_eq!(
            ActionTerm::for_trade(InstrumentKind::Put, Side::Sell, true),
            ActionTerm::Sto
        );
        assert_eq!(
            ActionTerm::for_trade(InstrumentKind::Put, Side::Buy, false),
            ActionTerm::Btc
        );
        assert_eq!(
            ActionTerm::for_trade(InstrumentKind::Call, Side::Sell, false),
            ActionTerm::Stc
        );
        assert_eq!(
            ActionTerm::for_trade(InstrumentKind::Shares, Side::Sell, false),
            ActionTerm::Sell
        );
        let out = Money::parse(-5.0, "USD").unwrap();
        assert_eq!(ActionTerm::for_cash(&out), ActionTerm::Withdrawal);
    }

    #[test]
    fn test_action_term_serialization() {
        let json = serde_json::to_string(&ActionTerm::Bto).unwrap();
        assert_eq!(json, "\"BTO\"");
    }
}
