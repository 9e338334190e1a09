//! Domain primitives: identifiers, Side, InstrumentKind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Point in time of a transaction (UTC).
pub type Timestamp = DateTime<Utc>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the id is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Transaction identifier, unique within a batch.
    TxnId
);
string_id!(
    /// Owner of the transactions.
    UserId
);
string_id!(
    /// Brokerage or cash account.
    AccountId
);
string_id!(
    /// Underlying symbol (e.g., "AAPL").
    Ticker
);

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Cash leaves the account.
    Buy,
    /// Cash enters the account.
    Sell,
}

impl Side {
    /// Direction of the position change: +1 for Buy, -1 for Sell.
    pub fn sign(&self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    /// Direction of the cash effect: -1 for Buy, +1 for Sell.
    pub fn cash_sign(&self) -> i32 {
        -self.sign()
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(s.to_string()),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Closed set of ledger-able instrument kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentKind {
    Cash,
    Shares,
    Call,
    Put,
}

impl InstrumentKind {
    /// Units controlled by one quantity unit (100 shares per option contract).
    pub fn multiplier(&self) -> i64 {
        match self {
            InstrumentKind::Cash | InstrumentKind::Shares => 1,
            InstrumentKind::Call | InstrumentKind::Put => 100,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, InstrumentKind::Call | InstrumentKind::Put)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Cash => "CASH",
            InstrumentKind::Shares => "SHARES",
            InstrumentKind::Call => "CALL",
            InstrumentKind::Put => "PUT",
        }
    }
}

impl FromStr for InstrumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASH" => Ok(InstrumentKind::Cash),
            "SHARES" => Ok(InstrumentKind::Shares),
            "CALL" => Ok(InstrumentKind::Call),
            "PUT" => Ok(InstrumentKind::Put),
            _ => Err(s.to_string()),
        }
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
