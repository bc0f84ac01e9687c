use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency codes the practice can bill in.
///
/// Every amount inside one client's billing graph shares a single currency;
/// conversion between them is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum Currency {
    #[sqlx(rename = "GBP")]
    #[serde(rename = "GBP")]
    Gbp,
    #[sqlx(rename = "EUR")]
    #[serde(rename = "EUR")]
    Eur,
    #[sqlx(rename = "USD")]
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gbp => "GBP",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Gbp => "£",
            Currency::Eur => "€",
            Currency::Usd => "$",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Gbp
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code.trim().to_ascii_uppercase().as_str() {
            "GBP" => Ok(Currency::Gbp),
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("cannot combine {left} with {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("amount is out of range")]
    Overflow,
    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),
}

/// An exact currency amount held as an integer count of minor units
/// (pence for GBP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: Currency,
}

const MINOR_PER_MAJOR: i64 = 100;

impl Money {
    pub const fn new(minor_units: i64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    pub const fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Shorthand for pounds sterling in pence.
    pub const fn gbp(pence: i64) -> Self {
        Self::new(pence, Currency::Gbp)
    }

    /// Builds an amount from a major-unit decimal such as `180.00`,
    /// rounding half-to-even onto the minor unit.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let minor = (amount * Decimal::from(MINOR_PER_MAJOR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(minor, currency))
    }

    /// The amount in major units, e.g. `180.00`.
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.minor_units, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    /// Magnitude of the amount; `i64::MIN` has none that fits.
    pub fn checked_abs(&self) -> Result<Money, MoneyError> {
        let minor = self.minor_units.checked_abs().ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    pub fn checked_neg(&self) -> Result<Money, MoneyError> {
        let minor = self.minor_units.checked_neg().ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// True when this amount's magnitude is larger than `other`'s,
    /// whatever their signs. Defined for every `i64`.
    pub fn exceeds_in_magnitude(&self, other: &Money) -> bool {
        self.minor_units.unsigned_abs() > other.minor_units.unsigned_abs()
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        let minor = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.checked_add(other.checked_neg()?)
    }

    /// Multiplies by a scalar quantity, rounding half-to-even onto the
    /// minor unit.
    pub fn times(&self, quantity: Decimal) -> Result<Money, MoneyError> {
        let minor = (Decimal::from(self.minor_units) * quantity)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// Sums amounts that must all be in `currency`. An empty iterator sums
    /// to zero.
    pub fn sum<I>(amounts: I, currency: Currency) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |total, amount| total.checked_add(amount))
    }

    /// Human formatting with symbol and thousands separators: `£1,234.50`,
    /// `-£50.00`.
    pub fn format(&self) -> String {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let magnitude = self.minor_units.unsigned_abs();
        let major = (magnitude / MINOR_PER_MAJOR as u64).to_string();
        let minor = magnitude % MINOR_PER_MAJOR as u64;

        let mut grouped = String::with_capacity(major.len() + major.len() / 3);
        for (i, digit) in major.chars().enumerate() {
            if i > 0 && (major.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }

        format!("{}{}{}.{:02}", sign, self.currency.symbol(), grouped, minor)
    }
}

impl PartialOrd for Money {
    /// Amounts in different currencies are not comparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency == other.currency {
            Some(self.minor_units.cmp(&other.minor_units))
        } else {
            None
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}
