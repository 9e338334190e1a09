//! Stable transaction ordering for deterministic processing.

use crate::domain::{NormalizedTransaction, RawTransaction, Timestamp, TxnId};

/// Stable ordering key for transactions.
///
/// Ordering: timestamp -> transaction id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxnOrderingKey {
    /// Primary sort.
    pub timestamp: Timestamp,
    /// Tie-break for equal timestamps.
    pub id: TxnId,
}

/// Anything that can be placed on the deterministic timeline.
pub trait Ordered {
    fn ordering_key(&self) -> TxnOrderingKey;
}

impl Ordered for RawTransaction {
    fn ordering_key(&self) -> TxnOrderingKey {
        TxnOrderingKey {
            timestamp: self.timestamp,
            id: self.id.clone(),
        }
    }
}

impl Ordered for NormalizedTransaction {
    fn ordering_key(&self) -> TxnOrderingKey {
        TxnOrderingKey {
            timestamp: self.timestamp,
            id: self.id.clone(),
        }
    }
}

/// Sort deterministically by (timestamp, id). The sort is stable, so exact
/// duplicates keep their input order.
pub fn sort_deterministic<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(|item| item.ordering_key());
}

/// Borrowing variant: returns references in deterministic order.
pub fn sorted_refs<T: Ordered>(items: &[T]) -> Vec<&T> {
    let mut refs: Vec<&T> = items.iter().collect();
    refs.sort_by_key(|item| item.ordering_key());
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn make_txn(id: &str, secs: i64) -> RawTransaction {
        RawTransaction::new(
            id,
            "acct",
            Utc.timestamp_opt(secs, 0).unwrap(),
            "CASH",
            Decimal::ONE,
            "USD",
        )
    }

    #[test]
    fn test_ordering_by_time() {
        let a = make_txn("b", 1000);
        let b = make_txn("a", 2000);
        assert!(a.ordering_key() < b.ordering_key());
    }

    #[test]
    fn test_same_time_ordered_by_id() {
        let a = make_txn("t-1", 1000);
        let b = make_txn("t-2", 1000);
        assert!(a.ordering_key() < b.ordering_key());
    }

    #[test]
    fn test_sort_deterministic() {
        let mut txns = vec![
            make_txn("t-3", 2000),
            make_txn("t-2", 1000),
            make_txn("t-1", 1000),
        ];
        sort_deterministic(&mut txns);
        let ids: Vec<&str> = txns.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t-1", "t-2", "t-3"]);
    }

    #[test]
    fn test_sorted_refs_leaves_input_untouched() {
        let txns = vec![make_txn("t-2", 2000), make_txn("t-1", 1000)];
        let refs = sorted_refs(&txns);
        assert_eq!(refs[0].id.as_str(), "t-1");
        assert_eq!(txns[0].id.as_str(), "t-2");
    }
}
