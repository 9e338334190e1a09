//! Domain types and determinism layer for the trade ledger.
//!
//! This module provides:
//! - Currency-safe money via [`Money`] and the closed [`Currency`] set
//! - Domain primitives: identifiers, Side, InstrumentKind
//! - Raw and normalized transaction records
//! - Stable transaction ordering for deterministic folds

pub mod currency;
pub mod money;
pub mod ordering;
pub mod primitives;
pub mod transaction;

pub use currency::Currency;
pub use money::{FormatOptions, Money, MoneyError};
pub use ordering::{sort_deterministic, sorted_refs, Ordered, TxnOrderingKey};
pub use primitives::{AccountId, InstrumentKind, Side, Ticker, Timestamp, TxnId, UserId};
pub use transaction::{NormalizedTransaction, RawTransaction};
