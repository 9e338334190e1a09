//! Currency-tagged monetary amounts backed by rust_decimal.
//!
//! Amounts are rounded to the currency's minor unit on construction and after
//! every arithmetic step, using round-half-away-from-zero. Values of different
//! currencies are never combined: every binary operation checks the tag and
//! fails with [`MoneyError::CurrencyMismatch`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::currency::Currency;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Invalid currency code: {0}")]
    InvalidCurrencyCode(String),
    #[error("Invalid magnitude: {0}")]
    InvalidMagnitude(String),
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },
    #[error("Invalid divisor: {0}")]
    InvalidDivisor(String),
    #[error("Cannot aggregate an empty sequence")]
    EmptySequence,
}

/// An immutable amount of a single currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "MoneyRepr")]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

#[derive(Deserialize)]
struct MoneyRepr {
    amount: Decimal,
    currency: Currency,
}

impl From<MoneyRepr> for Money {
    fn from(repr: MoneyRepr) -> Self {
        Money::new(repr.amount, repr.currency)
    }
}

/// Rendering options for [`Money::format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub show_symbol: bool,
    pub show_code: bool,
    /// Decimal places; `None` uses the currency's minor units.
    pub precision: Option<u32>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            show_symbol: true,
            show_code: false,
            precision: None,
        }
    }
}

fn round_to(amount: Decimal, dp: u32) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

fn decimal_from_f64(value: f64) -> Result<Decimal, MoneyError> {
    if !value.is_finite() {
        return Err(MoneyError::InvalidMagnitude(value.to_string()));
    }
    // Display yields the shortest string that round-trips, so 100.005 parses
    // as written rather than as its binary approximation.
    Decimal::from_str(&value.to_string())
        .map_err(|_| MoneyError::InvalidMagnitude(value.to_string()))
}

impl Money {
    /// Build a Money value, rounding to the currency's minor units.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money {
            amount: round_to(amount, currency.minor_units()),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    /// Build from a float.
    ///
    /// # Errors
    /// `InvalidMagnitude` if the value is NaN, infinite or out of range.
    pub fn from_f64(value: f64, currency: Currency) -> Result<Self, MoneyError> {
        Ok(Money::new(decimal_from_f64(value)?, currency))
    }

    /// Build from a float and an untyped currency code.
    pub fn parse(value: f64, code: &str) -> Result<Self, MoneyError> {
        let currency = Currency::from_str(code)?;
        Money::from_f64(value, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    fn ensure_same(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency,
                found: other.currency,
            });
        }
        Ok(())
    }

    pub fn try_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same(other)?;
        self.amount
            .checked_add(other.amount)
            .map(|sum| Money::new(sum, self.currency))
            .ok_or_else(|| MoneyError::InvalidMagnitude("addition overflow".to_string()))
    }

    pub fn try_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same(other)?;
        self.amount
            .checked_sub(other.amount)
            .map(|diff| Money::new(diff, self.currency))
            .ok_or_else(|| MoneyError::InvalidMagnitude("subtraction overflow".to_string()))
    }

    /// Multiply by a dimensionless scalar.
    pub fn try_mul(&self, scalar: Decimal) -> Result<Money, MoneyError> {
        self.amount
            .checked_mul(scalar)
            .map(|product| Money::new(product, self.currency))
            .ok_or_else(|| MoneyError::InvalidMagnitude("multiplication overflow".to_string()))
    }

    pub fn mul_f64(&self, scalar: f64) -> Result<Money, MoneyError> {
        self.try_mul(decimal_from_f64(scalar)?)
    }

    /// Divide by a dimensionless scalar.
    pub fn try_div(&self, scalar: Decimal) -> Result<Money, MoneyError> {
        if scalar.is_zero() {
            return Err(MoneyError::InvalidDivisor(scalar.to_string()));
        }
        self.amount
            .checked_div(scalar)
            .map(|quotient| Money::new(quotient, self.currency))
            .ok_or_else(|| MoneyError::InvalidMagnitude("division overflow".to_string()))
    }

    pub fn div_f64(&self, scalar: f64) -> Result<Money, MoneyError> {
        let divisor =
            decimal_from_f64(scalar).map_err(|_| MoneyError::InvalidDivisor(scalar.to_string()))?;
        self.try_div(divisor)
    }

    pub fn try_cmp(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.ensure_same(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn try_eq(&self, other: &Money) -> Result<bool, MoneyError> {
        Ok(self.try_cmp(other)? == Ordering::Equal)
    }

    pub fn neg(&self) -> Money {
        Money::new(-self.amount, self.currency)
    }

    pub fn abs(&self) -> Money {
        Money::new(self.amount.abs(), self.currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.amount.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.amount.is_sign_negative()
    }

    /// Sum a non-empty sequence of same-currency values.
    pub fn sum<'a, I>(items: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        let mut iter = items.into_iter();
        let first = iter.next().ok_or(MoneyError::EmptySequence)?;
        iter.try_fold(*first, |acc, m| acc.try_add(m))
    }

    /// Arithmetic mean of a non-empty sequence of same-currency values.
    pub fn average<'a, I>(items: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        let mut count: u64 = 0;
        let mut total: Option<Money> = None;
        for m in items {
            count += 1;
            total = Some(match total {
                None => *m,
                Some(acc) => acc.try_add(m)?,
            });
        }
        let total = total.ok_or(MoneyError::EmptySequence)?;
        total.try_div(Decimal::from(count))
    }

    pub fn format(&self, options: &FormatOptions) -> String {
        let precision = options.precision.unwrap_or(self.currency.minor_units());
        let shown = round_to(self.amount.abs(), precision);
        let sign = if self.amount.is_sign_negative() && !shown.is_zero() {
            "-"
        } else {
            ""
        };
        let symbol = if options.show_symbol {
            self.currency.symbol()
        } else {
            ""
        };
        let mut out = format!("{}{}{}", sign, symbol, shown);
        if options.show_code {
            out.push(' ');
            out.push_str(self.currency.code());
        }
        out
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(v: f64) -> Money {
        Money::from_f64(v, Currency::Usd).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(usd(100.005).amount(), dec("100.01"));
        assert_eq!(usd(-100.005).amount(), dec("-100.01"));
        assert_eq!(usd(100.004).amount(), dec("100.00"));
        let yen = Money::from_f64(100.5, Currency::Jpy).unwrap();
        assert_eq!(yen.amount(), dec("101"));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            Money::from_f64(f64::NAN, Currency::Usd),
            Err(MoneyError::InvalidMagnitude(_))
        ));
        assert!(matches!(
            Money::from_f64(f64::INFINITY, Currency::Usd),
            Err(MoneyError::InvalidMagnitude(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_code() {
        assert_eq!(
            Money::parse(1.0, "ZZZ"),
            Err(MoneyError::InvalidCurrencyCode("ZZZ".to_string()))
        );
        assert_eq!(Money::parse(1.0, "eur").unwrap().currency(), Currency::Eur);
    }

    #[test]
    fn test_cross_currency_operations_fail() {
        let a = usd(100.0);
        let b = Money::from_f64(50.0, Currency::Eur).unwrap();
        let expected = MoneyError::CurrencyMismatch {
            expected: Currency::Usd,
            found: Currency::Eur,
        };
        assert_eq!(a.try_add(&b), Err(expected.clone()));
        assert_eq!(a.try_sub(&b), Err(expected.clone()));
        assert_eq!(a.try_cmp(&b), Err(expected.clone()));
        assert_eq!(a.try_eq(&b), Err(expected));
    }

    #[test]
    fn test_same_currency_arithmetic() {
        let a = usd(100.10);
        let b = usd(0.25);
        assert_eq!(a.try_add(&b).unwrap().amount(), dec("100.35"));
        assert_eq!(a.try_sub(&b).unwrap().amount(), dec("99.85"));
        assert_eq!(a.try_cmp(&b).unwrap(), Ordering::Greater);
        assert!(a.try_eq(&usd(100.1)).unwrap());
    }

    #[test]
    fn test_scalar_ops_preserve_currency() {
        let a = usd(10.0);
        let tripled = a.try_mul(dec("3")).unwrap();
        assert_eq!(tripled.amount(), dec("30.00"));
        assert_eq!(tripled.currency(), Currency::Usd);

        let third = a.try_div(dec("3")).unwrap();
        assert_eq!(third.amount(), dec("3.33"));
    }

    #[test]
    fn test_divide_by_zero_or_non_finite() {
        let a = usd(10.0);
        assert!(matches!(a.try_div(Decimal::ZERO), Err(MoneyError::InvalidDivisor(_))));
        assert!(matches!(a.div_f64(0.0), Err(MoneyError::InvalidDivisor(_))));
        assert!(matches!(a.div_f64(f64::NAN), Err(MoneyError::InvalidDivisor(_))));
    }

    #[test]
    fn test_sign_helpers() {
        assert!(usd(-1.0).is_negative());
        assert!(usd(1.0).is_positive());
        assert!(usd(0.0).is_zero());
        assert!(!usd(0.0).is_positive());
        assert_eq!(usd(-2.5).abs(), usd(2.5));
        assert_eq!(usd(2.5).neg(), usd(-2.5));
    }

    #[test]
    fn test_sum_and_average() {
        let empty: Vec<Money> = Vec::new();
        assert_eq!(Money::sum(&empty), Err(MoneyError::EmptySequence));
        assert_eq!(Money::average(&empty), Err(MoneyError::EmptySequence));

        let values = [usd(100.0), usd(50.0), usd(0.01)];
        assert_eq!(Money::sum(&values).unwrap().amount(), dec("150.01"));
        assert_eq!(Money::average(&values).unwrap().amount(), dec("50.00"));

        let mixed = [usd(100.0), Money::from_f64(50.0, Currency::Eur).unwrap()];
        assert!(matches!(
            Money::sum(&mixed),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_format_options() {
        let m = usd(-1234.5);
        assert_eq!(m.format(&FormatOptions::default()), "-$1234.50");
        let opts = FormatOptions {
            show_symbol: false,
            show_code: true,
            precision: Some(0),
        };
        assert_eq!(m.format(&opts), "-1235 USD");
        let yen = Money::from_f64(1500.0, Currency::Jpy).unwrap();
        assert_eq!(yen.format(&FormatOptions::default()), "¥1500");
        assert_eq!(yen.to_string(), "1500 JPY");
    }

    #[test]
    fn test_serialization_keeps_minor_units() {
        let json = serde_json::to_value(usd(5000.0)).unwrap();
        assert_eq!(json["amount"], "5000.00");
        assert_eq!(json["currency"], "USD");

        let parsed: Money =
            serde_json::from_str(r#"{"amount":"1.005","currency":"USD"}"#).unwrap();
        assert_eq!(parsed.amount(), dec("1.01"));
    }
}
