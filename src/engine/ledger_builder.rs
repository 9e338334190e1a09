use std::collections::HashSet;
use std::str::FromStr;

use crate::domain::{
    sorted_refs, AccountId, Currency, InstrumentKind, Money, NormalizedTransaction,
    RawTransaction, TxnId,
};
use crate::error::EngineError;

use super::{Balances, Ledger, LedgerRow};

/// Domain rules applied while building the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Reject any row that would leave its (account, currency) balance below zero.
    pub reject_negative_balance: bool,
}

/// Folds transactions, in order, into per-(account, currency) running balances.
///
/// Rows are append-only. A rejected row records its cash delta but repeats
/// the prior balance.
pub struct LedgerBuilder {
    config: LedgerConfig,
    balances: Balances,
    seen: HashSet<TxnId>,
    rows: Vec<LedgerRow>,
}

impl LedgerBuilder {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            balances: Balances::new(),
            seen: HashSet::new(),
            rows: Vec::new(),
        }
    }

    /// Current balance for an (account, currency) pair; zero if untouched.
    pub fn balance(&self, account: &AccountId, currency: Currency) -> Money {
        self.balances
            .get(account)
            .and_then(|by_currency| by_currency.get(&currency))
            .copied()
            .unwrap_or_else(|| Money::zero(currency))
    }

    /// Apply one normalized transaction. Callers feed transactions in
    /// (timestamp, id) order.
    ///
    /// # Errors
    /// Only for impossible states (a cash delta in a currency other than the
    /// transaction's). Domain rejections, including a balance that would
    /// leave the representable range, are recorded on the row.
    pub fn apply(&mut self, txn: &NormalizedTransaction) -> Result<&LedgerRow, EngineError> {
        let prior = self.balance(&txn.account_id, txn.currency);
        if txn.total_value.currency() != txn.currency {
            return Err(EngineError::LedgerInvariantViolation {
                txn_id: txn.id.clone(),
                reason: format!(
                    "cash delta in {} for a {} transaction",
                    txn.total_value.currency(),
                    txn.currency
                ),
            });
        }

        let outcome = match self.rejection_reason(txn) {
            Some(reason) => Err(reason),
            None => self.next_balance(txn, &prior),
        };
        self.seen.insert(txn.id.clone());

        let balance_after = match &outcome {
            Ok(next) => {
                self.balances
                    .entry(txn.account_id.clone())
                    .or_default()
                    .insert(txn.currency, *next);
                *next
            }
            Err(reason) => {
                tracing::debug!(txn_id = %txn.id, account = %txn.account_id, reason = %reason, "Ledger row rejected");
                prior
            }
        };

        let index = self.rows.len();
        self.rows.push(LedgerRow {
            txn_id: txn.id.clone(),
            account_id: txn.account_id.clone(),
            timestamp: txn.timestamp,
            currency: Some(txn.currency),
            cash_delta: Some(txn.total_value),
            balance_after: Some(balance_after),
            accepted: outcome.is_ok(),
            error: outcome.err(),
        });
        Ok(&self.rows[index])
    }

    /// Record a transaction that could not be normalized.
    pub fn reject_unnormalized(&mut self, raw: &RawTransaction, error: &EngineError) {
        let currency = Currency::from_str(&raw.currency).ok();
        let balance_after = currency.map(|c| self.balance(&raw.account_id, c));
        self.seen.insert(raw.id.clone());

        tracing::debug!(txn_id = %raw.id, error = %error, "Transaction failed normalization");

        self.rows.push(LedgerRow {
            txn_id: raw.id.clone(),
            account_id: raw.account_id.clone(),
            timestamp: raw.timestamp,
            currency,
            cash_delta: None,
            balance_after,
            accepted: false,
            error: Some(error.to_string()),
        });
    }

    fn rejection_reason(&self, txn: &NormalizedTransaction) -> Option<String> {
        if txn.id.is_blank() {
            return Some("missing transaction id".to_string());
        }
        if self.seen.contains(&txn.id) {
            return Some(format!("duplicate transaction id {}", txn.id));
        }
        if txn.account_id.is_blank() {
            return Some("missing account id".to_string());
        }
        match txn.instrument_kind {
            InstrumentKind::Cash => None,
            InstrumentKind::Shares | InstrumentKind::Call | InstrumentKind::Put => {
                if txn.ticker.as_ref().map_or(true, |t| t.is_blank()) {
                    Some(format!("{} transaction has no ticker", txn.instrument_kind))
                } else {
                    None
                }
            }
        }
    }

    /// Balance after applying `txn`, or the reason it cannot be applied.
    fn next_balance(&self, txn: &NormalizedTransaction, prior: &Money) -> Result<Money, String> {
        let next = prior
            .try_add(&txn.total_value)
            .map_err(|e| format!("balance out of range: {}", e))?;
        if self.config.reject_negative_balance && txn.total_value.is_negative() && next.is_negative() {
            return Err(format!(
                "would drive balance negative ({} -> {})",
                prior, next
            ));
        }
        Ok(next)
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn into_ledger(self) -> Ledger {
        Ledger {
            rows: self.rows,
            balances: self.balances,
        }
    }
}

/// Build a ledger from normalized transactions.
///
/// Transactions are folded in (timestamp, id) order and rows are emitted in
/// that order.
pub fn build_ledger(
    txns: &[NormalizedTransaction],
    config: &LedgerConfig,
) -> Result<Ledger, EngineError> {
    let mut builder = LedgerBuilder::new(config.clone());
    for txn in sorted_refs(txns) {
        builder.apply(txn)?;
    }
    Ok(builder.into_ledger())
}
