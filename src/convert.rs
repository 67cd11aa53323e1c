//! Currency conversion.
//!
//! The ledger never sources exchange rates itself. Callers hand it a
//! [`Converter`]; [`FixedRates`] is a table-backed implementation.

use crate::error::{LedgerError, Result};
use crate::money::{overflow, Currency, Money};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

/// Converts money into another currency.
pub trait Converter: Send + Sync {
    /// Returns `money` expressed in `target`.
    ///
    /// Implementations must return `money` unchanged when it is already in `target`.
    fn convert(&self, money: Money, target: Currency) -> Result<Money>;
}

/// Decimal places kept after a conversion.
const CONVERTED_SCALE: u32 = 2;

/// A fixed table of conversion rates.
///
/// A missing `from -> to` rate falls back to the inverse of `to -> from`.
#[derive(Debug, Clone, Default)]
pub struct FixedRates {
    rates: HashMap<(Currency, Currency), Decimal>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the rate to go from `from` to `to`: `1 from = rate to`.
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: Decimal) -> Self {
        self.set_rate(from, to, rate);
        self
    }

    pub fn set_rate(&mut self, from: Currency, to: Currency, rate: Decimal) {
        self.rates.insert((from, to), rate);
    }

    fn rate(&self, from: Currency, to: Currency) -> Option<Decimal> {
        if let Some(rate) = self.rates.get(&(from, to)) {
            return Some(*rate);
        }
        self.rates
            .get(&(to, from))
            .filter(|r| !r.is_zero())
            .and_then(|r| Decimal::ONE.checked_div(*r))
    }
}

impl Converter for FixedRates {
    fn convert(&self, money: Money, target: Currency) -> Result<Money> {
        if money.currency == target {
            return Ok(money);
        }
        let rate = self.rate(money.currency, target).ok_or(LedgerError::MissingRate {
            from: money.currency,
            to: target,
        })?;
        let amount = money
            .amount
            .checked_mul(rate)
            .ok_or_else(|| overflow(money))?
            .round_dp_with_strategy(CONVERTED_SCALE, RoundingStrategy::MidpointAwayFromZero);
        Ok(Money::new(amount, target))
    }
}
