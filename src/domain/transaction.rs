//! Raw and normalized transaction records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Currency, InstrumentKind, Money, Side, Ticker, Timestamp, TxnId, UserId};

/// A transaction as supplied by an import pipeline or entry form.
///
/// Kind, side and currency stay untyped here; the normalizer is the single
/// place where they are validated. Amount fields are denominated in
/// `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub id: TxnId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub instrument_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<Ticker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    /// Signed for CASH (deposit > 0, withdrawal < 0), magnitude otherwise.
    pub qty: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub fees: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl RawTransaction {
    /// Create a bare transaction; optional fields are set with the `with_*` helpers.
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        timestamp: Timestamp,
        instrument_kind: impl Into<String>,
        qty: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        RawTransaction {
            id: TxnId::new(id),
            user_id: UserId::new(""),
            account_id: AccountId::new(account_id),
            timestamp,
            instrument_kind: instrument_kind.into(),
            ticker: None,
            expiry: None,
            strike: None,
            side: None,
            qty,
            price: None,
            fees: Decimal::ZERO,
            currency: currency.into(),
            memo: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = UserId::new(user_id);
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(Ticker::new(ticker));
        self
    }

    pub fn with_side(mut self, side: impl Into<String>) -> Self {
        self.side = Some(side.into());
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_fees(mut self, fees: Decimal) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_option(mut self, expiry: NaiveDate, strike: Decimal) -> Self {
        self.expiry = Some(expiry);
        self.strike = Some(strike);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// A fully priced, currency-typed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTransaction {
    pub id: TxnId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub instrument_kind: InstrumentKind,
    pub ticker: Option<Ticker>,
    pub expiry: Option<NaiveDate>,
    pub strike: Option<Money>,
    /// Always `None` for CASH.
    pub side: Option<Side>,
    pub qty: Decimal,
    pub price: Money,
    pub fees: Money,
    pub currency: Currency,
    pub memo: Option<String>,
    /// Signed cash effect including fees: negative when cash leaves.
    pub total_value: Money,
}

impl NormalizedTransaction {
    /// Key of the episode stream this transaction belongs to.
    ///
    /// `None` for a non-cash transaction without a ticker.
    pub fn episode_key(&self) -> Option<String> {
        match self.instrument_kind {
            InstrumentKind::Cash => Some("CASH".to_string()),
            InstrumentKind::Shares => self.ticker.as_ref().map(|t| t.as_str().to_string()),
            InstrumentKind::Call | InstrumentKind::Put => self
                .ticker
                .as_ref()
                .map(|t| format!("{}|{}", t, self.instrument_kind)),
        }
    }

    /// Identifies the exact contract traded, e.g. `TSLA|PUT|2025-12-19|200.00`.
    pub fn instrument_key(&self) -> Option<String> {
        let ticker = self.ticker.as_ref()?;
        match self.instrument_kind {
            InstrumentKind::Cash => None,
            InstrumentKind::Shares => Some(ticker.as_str().to_string()),
            InstrumentKind::Call | InstrumentKind::Put => {
                let expiry = self.expiry?;
                let strike = self.strike?;
                Some(format!(
                    "{}|{}|{}|{}",
                    ticker,
                    self.instrument_kind,
                    expiry,
                    strike.amount()
                ))
            }
        }
    }
}
