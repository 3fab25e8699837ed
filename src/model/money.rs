//! Immutable money values: a `Decimal` amount paired with the currency it is denominated in.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Above this magnitude amounts are rendered without decimal places.
const WHOLE_UNITS_THRESHOLD: i64 = 10_000;

/// A currency as the server describes it, e.g. `{"code": "EUR", "symbol": "€"}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency {
    code: String,
    symbol: String,
}

impl Currency {
    /// Creates a currency. The code must be three ASCII letters; it is upper-cased.
    pub fn new(code: impl AsRef<str>, symbol: impl Into<String>) -> Result<Self> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::invalid(
                "currency",
                format!("'{code}' is not a three letter currency code"),
            ));
        }
        Ok(Self {
            code: code.to_ascii_uppercase(),
            symbol: symbol.into(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

/// Euro, the currency new accounts start with.
impl Default for Currency {
    fn default() -> Self {
        Self {
            code: "EUR".to_string(),
            symbol: "€".to_string(),
        }
    }
}

/// An amount of money in a single currency.
///
/// Arithmetic never mixes currencies:
/// ```
/// # use expense_sync::model::{Currency, Money};
/// # use rust_decimal::Decimal;
/// let eur = Currency::new("EUR", "€").unwrap();
/// let usd = Currency::new("USD", "$").unwrap();
/// let a = Money::new(Decimal::new(1050, 2), eur.clone());
/// let b = Money::new(Decimal::new(250, 2), eur);
/// assert_eq!(a.add(&b).unwrap().value(), Decimal::new(1300, 2));
/// assert!(a.add(&Money::new(Decimal::ONE, usd)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Adds two amounts, failing with `CurrencyMismatch` when the currency codes differ.
    pub fn add(&self, other: &Money) -> Result<Money> {
        if self.currency.code != other.currency.code {
            return Err(Error::CurrencyMismatch {
                left: self.currency.code.clone(),
                right: other.currency.code.clone(),
            });
        }
        Ok(Money::new(self.value + other.value, self.currency.clone()))
    }

    pub fn negate(&self) -> Money {
        Money::new(-self.value, self.currency.clone())
    }

    /// Renders the amount with the currency symbol and thousands separators. Magnitudes above
    /// 10,000 get no decimal places, everything else gets two. A `+` or `-` prefix is only added
    /// when `with_sign` is set and the value is non-zero; otherwise the magnitude is shown.
    pub fn format(&self, with_sign: bool) -> String {
        let magnitude = self.value.abs();
        let f = magnitude.to_f64().unwrap_or_default();
        let number = if magnitude > Decimal::from(WHOLE_UNITS_THRESHOLD) {
            format_num::format_num!(",.0f", f)
        } else {
            format_num::format_num!(",.2f", f)
        };
        let sign = match (with_sign, self.value.is_zero(), self.value.is_sign_negative()) {
            (false, _, _) | (true, true, _) => "",
            (true, false, true) => "-",
            (true, false, false) => "+",
        };
        format!("{sign}{}{number}", self.currency.symbol)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn eur() -> Currency {
        Currency::new("eur", "€").unwrap()
    }

    fn m(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap(), eur())
    }

    #[test]
    fn test_currency_code_is_normalized() {
        assert_eq!(eur().code(), "EUR");
        assert!(Currency::new("EURO", "€").is_err());
        assert!(Currency::new("E1R", "€").is_err());
    }

    #[test]
    fn test_add_same_currency() {
        assert_eq!(m("10.25").add(&m("-0.25")).unwrap(), m("10.00"));
    }

    #[test]
    fn test_add_currency_mismatch() {
        let usd = Money::new(Decimal::ONE, Currency::new("USD", "$").unwrap());
        match m("1").add(&usd) {
            Err(Error::CurrencyMismatch { left, right }) => {
                assert_eq!(left, "EUR");
                assert_eq!(right, "USD");
            }
            other => panic!("expected a currency mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_format_small_amounts_have_two_decimals() {
        assert_eq!(m("1234.5").format(false), "€1,234.50");
        assert_eq!(m("10000").format(false), "€10,000.00");
    }

    #[test]
    fn test_format_large_amounts_have_no_decimals() {
        assert_eq!(m("12345.67").format(false), "€12,346");
    }

    #[test]
    fn test_format_sign() {
        assert_eq!(m("-5").format(true), "-€5.00");
        assert_eq!(m("5").format(true), "+€5.00");
        assert_eq!(m("-5").format(false), "€5.00");
        assert_eq!(m("0").format(true), "€0.00");
    }

    #[test]
    fn test_json_uses_numbers() {
        let json = serde_json::to_value(m("12.5")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value": 12.5, "currency": {"code": "EUR", "symbol": "€"}})
        );
        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back.value(), Decimal::from_str("12.5").unwrap());
    }
}
