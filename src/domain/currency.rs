//! Closed set of supported ISO 4217 currencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::MoneyError;

/// ISO 4217 currency code.
///
/// Parsing from a string is the only runtime validation point; everything
/// downstream works with this enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Nzd,
    Chf,
    Cny,
    Hkd,
    Sgd,
    Sek,
    Nok,
    Dkk,
    Inr,
    Jpy,
    Krw,
}

impl Currency {
    pub const ALL: [Currency; 16] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Cad,
        Currency::Aud,
        Currency::Nzd,
        Currency::Chf,
        Currency::Cny,
        Currency::Hkd,
        Currency::Sgd,
        Currency::Sek,
        Currency::Nok,
        Currency::Dkk,
        Currency::Inr,
        Currency::Jpy,
        Currency::Krw,
    ];

    /// Three-letter ISO code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Nzd => "NZD",
            Currency::Chf => "CHF",
            Currency::Cny => "CNY",
            Currency::Hkd => "HKD",
            Currency::Sgd => "SGD",
            Currency::Sek => "SEK",
            Currency::Nok => "NOK",
            Currency::Dkk => "DKK",
            Currency::Inr => "INR",
            Currency::Jpy => "JPY",
            Currency::Krw => "KRW",
        }
    }

    /// Number of decimal places in the currency's minor unit.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Jpy | Currency::Krw => 0,
            _ => 2,
        }
    }

    /// Display symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Gbp => "£",
            Currency::Cad => "CA$",
            Currency::Aud => "A$",
            Currency::Nzd => "NZ$",
            Currency::Chf => "CHF",
            Currency::Cny => "CN¥",
            Currency::Hkd => "HK$",
            Currency::Sgd => "S$",
            Currency::Sek => "kr",
            Currency::Nok => "kr",
            Currency::Dkk => "kr",
            Currency::Inr => "₹",
            Currency::Jpy => "¥",
            Currency::Krw => "₩",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or_else(|| MoneyError::InvalidCurrencyCode(s.to_string()))
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.code().to_string()
    }
}
