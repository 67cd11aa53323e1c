//! Currency-tagged exact decimal amounts.
//!
//! Arithmetic between two `Money` values requires the same currency. Crossing
//! currencies goes through a [`Converter`](crate::convert::Converter).

use crate::error::{LedgerError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An ISO 4217 style currency code (three ASCII uppercase letters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    pub const EUR: Currency = Currency(*b"EUR");
    pub const USD: Currency = Currency(*b"USD");

    pub fn as_str(&self) -> &str {
        // Construction only accepts ASCII uppercase bytes.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(LedgerError::InvalidCurrency(code.to_string()));
        }
        Ok(Currency([bytes[0], bytes[1], bytes[2]]))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Currency::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An exact amount of money in a given currency.
///
/// # Examples
///
/// ```
/// use payin_ledger::Money;
///
/// let a: Money = "10.00 USD".parse().unwrap();
/// let b: Money = "2.50 USD".parse().unwrap();
/// assert_eq!(a.checked_add(&b).unwrap().to_string(), "12.50 USD");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    /// Returns `value` if set, else zero in `currency`.
    ///
    /// Used when accumulating into a cached field that may still be unset.
    pub fn coalesce(value: Option<Money>, currency: Currency) -> Money {
        value.unwrap_or_else(|| Money::zero(currency))
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    fn same_currency(&self, other: &Money) -> Result<()> {
        if self.currency != other.currency {
            return Err(LedgerError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| overflow(*self))?;
        Ok(Money::new(amount, self.currency))
    }

    /// Number of whole `unit`s contained in this amount, truncated.
    pub fn div_units(&self, unit: &Money) -> Result<i64> {
        self.same_currency(unit)?;
        if unit.is_zero() {
            return Err(LedgerError::InvalidAmount {
                amount: *unit,
                reason: "unit amount must not be zero",
            });
        }
        self.amount
            .checked_div(unit.amount)
            .ok_or_else(|| overflow(*self))?
            .trunc()
            .to_i64()
            .ok_or(LedgerError::InvalidAmount {
                amount: *self,
                reason: "unit count out of range",
            })
    }
}

pub(crate) fn overflow(amount: Money) -> LedgerError {
    LedgerError::InvalidAmount {
        amount,
        reason: "overflow",
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut amount = self.amount;
        if amount.scale() < 2 {
            amount.rescale(2);
        }
        write!(f, "{} {}", amount, self.currency)
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    /// Parses `"<amount> <CUR>"`, e.g. `"10.00 EUR"`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (amount, currency) = match (parts.next(), parts.next(), parts.next()) {
            (Some(amount), Some(currency), None) => (amount, currency),
            _ => return Err(LedgerError::InvalidMoney(s.to_string())),
        };
        let amount =
            Decimal::from_str(amount).map_err(|_| LedgerError::InvalidMoney(s.to_string()))?;
        Ok(Money::new(amount, currency.parse()?))
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}
