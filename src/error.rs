use thiserror::Error;

use crate::domain::{MoneyError, TxnId};

/// Errors raised by the normalizer, ledger builder and episode aggregator.
///
/// Transaction-scoped variants carry the offending id so a failed run can be
/// traced back to its input row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Money(#[from] MoneyError),
    #[error("Transaction {txn_id}: {source}")]
    MoneyAt {
        txn_id: TxnId,
        #[source]
        source: MoneyError,
    },
    #[error("Transaction {txn_id}: price is required for {kind}")]
    MissingPrice { txn_id: TxnId, kind: String },
    #[error("Transaction {txn_id}: side is required for {kind}")]
    MissingSide { txn_id: TxnId, kind: String },
    #[error("Transaction {txn_id}: unknown side '{side}'")]
    UnknownSide { txn_id: TxnId, side: String },
    #[error("Transaction {txn_id}: unknown instrument kind '{kind}'")]
    UnknownInstrumentKind { txn_id: TxnId, kind: String },
    #[error("Transaction {txn_id}: invalid quantity: {reason}")]
    InvalidQuantity { txn_id: TxnId, reason: String },
    #[error("Transaction {txn_id}: fees must not be negative")]
    InvalidFees { txn_id: TxnId },
    #[error("Transaction {txn_id}: option is missing {field}")]
    MissingOptionField { txn_id: TxnId, field: &'static str },
    #[error("Transaction {txn_id}: aggregation invariant violated: {reason}")]
    AggregationInvariantViolation { txn_id: TxnId, reason: String },
    #[error("Transaction {txn_id}: ledger invariant violated: {reason}")]
    LedgerInvariantViolation { txn_id: TxnId, reason: String },
}

impl EngineError {
    /// Attach a transaction id to a bare money error.
    pub fn at(txn_id: &TxnId, source: MoneyError) -> Self {
        EngineError::MoneyAt {
            txn_id: txn_id.clone(),
            source,
        }
    }

    /// The transaction this error refers to, when known.
    pub fn txn_id(&self) -> Option<&TxnId> {
        match self {
            EngineError::Money(_) => None,
            EngineError::MoneyAt { txn_id, .. }
            | EngineError::MissingPrice { txn_id, .. }
            | EngineError::MissingSide { txn_id, .. }
            | EngineError::UnknownSide { txn_id, .. }
            | EngineError::UnknownInstrumentKind { txn_id, .. }
            | EngineError::InvalidQuantity { txn_id, .. }
            | EngineError::InvalidFees { txn_id }
            | EngineError::MissingOptionField { txn_id, .. }
            | EngineError::AggregationInvariantViolation { txn_id, .. }
            | EngineError::LedgerInvariantViolation { txn_id, .. } => Some(txn_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    #[test]
    fn test_money_error_with_txn_context() {
        let err = EngineError::at(
            &TxnId::new("t-9"),
            MoneyError::CurrencyMismatch {
                expected: Currency::Usd,
                found: Currency::Eur,
            },
        );
        assert_eq!(
            err.to_string(),
            "Transaction t-9: Currency mismatch: expected USD, found EUR"
        );
        assert_eq!(err.txn_id().map(|t| t.as_str()), Some("t-9"));
    }

    #[test]
    fn test_missing_option_field_message() {
        let err = EngineError::MissingOptionField {
            txn_id: TxnId::new("t-1"),
            field: "strike",
        };
        assert_eq!(err.to_string(), "Transaction t-1: option is missing strike");
    }
}
