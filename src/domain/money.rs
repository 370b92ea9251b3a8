//! Money type
//!
//! Fixed-point currency value stored as an integer count of cents.
//! The textual form always carries exactly two decimal places and is the
//! only representation used on the wire.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by [`Money`].
const SCALE: u32 = 2;

/// Cents per currency unit.
const CENTS_PER_UNIT: i64 = 100;

/// Money represents a currency amount as an integer number of cents.
///
/// # Invariants
/// - Renders with exactly two decimal places
/// - `s.parse::<Money>()` of a rendered value yields the same value
///
/// # Example
/// ```
/// use balance_service::domain::Money;
///
/// let money: Money = "12.3".parse().unwrap();
/// assert_eq!(money.cents(), 1230);
/// assert_eq!(money.to_string(), "12.30");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

/// Errors that can occur when creating Money
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("empty string")]
    Empty,

    #[error("invalid money format: {0:?}")]
    InvalidFormat(String),

    #[error("max precision is 2 decimal places")]
    TooPrecise,

    #[error("money value out of range")]
    Overflow,
}

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest amount a ledger column can hold (`NUMERIC(14, 2)`)
    pub const MAX: Money = Money(99_999_999_999_999);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Convert a floating value by scaling to cents and truncating toward zero.
    ///
    /// Values outside the `i64` range saturate; NaN becomes zero.
    pub fn from_f64(value: f64) -> Self {
        Self((value * CENTS_PER_UNIT as f64) as i64)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    pub fn checked_neg(self) -> Option<Money> {
        self.0.checked_neg().map(Money)
    }
}

fn parse_digits(digits: &str, input: &str) -> Result<i64, MoneyError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(input.to_string()));
    }
    digits.parse::<i64>().map_err(|_| MoneyError::Overflow)
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(MoneyError::Empty);
        }

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let mut parts = unsigned.split('.');
        let units = parts.next().unwrap_or_default();
        let fraction = parts.next();
        if parts.next().is_some() {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }

        let units = parse_digits(units, s)?;
        let fraction = match fraction {
            None => 0,
            Some(digits) if digits.len() > SCALE as usize => {
                // Report garbage before precision: "1.5x1" is a format error
                parse_digits(digits, s)?;
                return Err(MoneyError::TooPrecise);
            }
            Some(digits) => {
                let value = parse_digits(digits, s)?;
                if digits.len() == 1 {
                    value * 10
                } else {
                    value
                }
            }
        };

        let magnitude = i128::from(units) * i128::from(CENTS_PER_UNIT) + i128::from(fraction);
        let cents = if negative { -magnitude } else { magnitude };

        i64::try_from(cents)
            .map(Money)
            .map_err(|_| MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / CENTS_PER_UNIT as u64,
            abs % CENTS_PER_UNIT as u64
        )
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Money::from_str(&value)
    }
}

impl From<Money> for String {
    fn from(money: Money) -> Self {
        money.to_string()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let cents = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?;
        if !cents.fract().is_zero() {
            return Err(MoneyError::TooPrecise);
        }
        cents.to_i64().map(Money).ok_or(MoneyError::Overflow)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        Decimal::new(money.0, SCALE)
    }
}

// Stored as NUMERIC in Postgres
impl Type<Postgres> for Money {
    fn type_info() -> PgTypeInfo {
        <Decimal as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <Decimal as Type<Postgres>>::compatible(ty)
    }
}

impl Encode<'_, Postgres> for Money {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        <Decimal as Encode<'_, Postgres>>::encode_by_ref(&Decimal::from(*self), buf)
    }
}

impl<'r> Decode<'r, Postgres> for Money {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let decimal = <Decimal as Decode<'r, Postgres>>::decode(value)?;
        Ok(Money::try_from(decimal)?)
    }
}
