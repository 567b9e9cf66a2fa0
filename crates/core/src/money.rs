//! Fixed-point money.
//!
//! Every amount is an integer count of 1/100,000ths of a currency unit tagged
//! with its currency. Conversion to a human decimal only happens at the
//! presentation boundary (`to_display` / `from_display`).
//!
//! Rounding policy: every operation that can produce a fractional scaled unit
//! (`multiply_by_ratio`, `divide`, display conversion) rounds half away from
//! zero through [`div_round_half_up`]. Commission and processor-fee math both go
//! through `multiply_by_ratio`, so they can never disagree on rounding.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits carried internally.
pub const SCALE: u32 = 5;

/// `10^SCALE`: scaled units per whole currency unit.
pub const SCALE_FACTOR: i64 = 100_000;

/// Fractional digits carried by [`Percentage`] (of the percent value itself).
const PERCENT_SCALE: i64 = 10_000;

/// Supported currencies. Each is tracked independently; nothing nets them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Cop,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Usd, Currency::Cop];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Cop => "COP",
        }
    }

    /// Presentation settings for this currency.
    pub fn config(&self) -> CurrencyConfig {
        match self {
            Currency::Usd => CurrencyConfig {
                currency: Currency::Usd,
                symbol: "$",
                display_decimals: 2,
            },
            Currency::Cop => CurrencyConfig {
                currency: Currency::Cop,
                symbol: "COL$",
                display_decimals: 2,
            },
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Presentation settings for a currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CurrencyConfig {
    pub currency: Currency,
    pub symbol: &'static str,
    pub display_decimals: u32,
}

/// Integer division rounding half away from zero. `den` must be positive.
pub(crate) fn div_round_half_up(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);
    let quotient = num / den;
    let remainder = num % den;
    if remainder.abs() * 2 >= den {
        quotient + num.signum()
    } else {
        quotient
    }
}

fn narrow(value: i128) -> DomainResult<i64> {
    i64::try_from(value).map_err(|_| DomainError::invariant("money overflow"))
}

/// A currency-tagged scaled integer amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    scaled: i64,
    currency: Currency,
}

impl ValueObject for Money {}

impl Money {
    /// Build from an already-scaled amount (1/100,000ths of a unit).
    pub const fn from_scaled(scaled: i64, currency: Currency) -> Self {
        Self { scaled, currency }
    }

    /// Build from whole currency units.
    pub fn from_units(units: i64, currency: Currency) -> DomainResult<Self> {
        let scaled = units
            .checked_mul(SCALE_FACTOR)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Self::from_scaled(scaled, currency))
    }

    pub const fn zero(currency: Currency) -> Self {
        Self::from_scaled(0, currency)
    }

    pub const fn scaled(&self) -> i64 {
        self.scaled
    }

    pub const fn currency(&self) -> Currency {
        self.currency
    }

    pub const fn is_zero(&self) -> bool {
        self.scaled == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.scaled > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.scaled < 0
    }

    pub fn ensure_same_currency(&self, other: &Money) -> DomainResult<()> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> DomainResult<Money> {
        self.ensure_same_currency(other)?;
        let scaled = self
            .scaled
            .checked_add(other.scaled)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Self::from_scaled(scaled, self.currency))
    }

    /// Negative results are permitted (they represent adjustments).
    pub fn subtract(&self, other: &Money) -> DomainResult<Money> {
        self.ensure_same_currency(other)?;
        let scaled = self
            .scaled
            .checked_sub(other.scaled)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Self::from_scaled(scaled, self.currency))
    }

    /// Multiply by a whole quantity (line item extension).
    pub fn multiply(&self, quantity: i64) -> DomainResult<Money> {
        let scaled = self
            .scaled
            .checked_mul(quantity)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Self::from_scaled(scaled, self.currency))
    }

    /// Take `percentage` of this amount, rounded half-up to the nearest scaled unit.
    pub fn multiply_by_ratio(&self, percentage: Percentage) -> DomainResult<Money> {
        let num = self.scaled as i128 * percentage.units() as i128;
        let den = 100 * PERCENT_SCALE as i128;
        Ok(Self::from_scaled(
            narrow(div_round_half_up(num, den))?,
            self.currency,
        ))
    }

    /// Split into `count` equal parts, rounded half-up.
    pub fn divide(&self, count: i64) -> DomainResult<Money> {
        if count == 0 {
            return Err(DomainError::DivisionByZero);
        }
        let (num, den) = if count < 0 {
            (-(self.scaled as i128), -(count as i128))
        } else {
            (self.scaled as i128, count as i128)
        };
        Ok(Self::from_scaled(
            narrow(div_round_half_up(num, den))?,
            self.currency,
        ))
    }

    /// Sum amounts that must all be in `currency`. Empty input sums to zero.
    pub fn sum<'a>(
        currency: Currency,
        amounts: impl IntoIterator<Item = &'a Money>,
    ) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.add(m))
    }

    /// Exact decimal value with all `SCALE` fractional digits.
    pub fn as_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.scaled as i128, SCALE)
    }

    /// Human-facing decimal, rounded half-up to the currency's display decimals.
    pub fn to_display(&self, config: &CurrencyConfig) -> DomainResult<Decimal> {
        if config.currency != self.currency {
            return Err(DomainError::CurrencyMismatch {
                left: self.currency,
                right: config.currency,
            });
        }
        Ok(self
            .as_decimal()
            .round_dp_with_strategy(config.display_decimals, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Display value using this amount's own currency settings.
    pub fn display_amount(&self) -> Decimal {
        self.as_decimal().round_dp_with_strategy(
            self.currency.config().display_decimals,
            RoundingStrategy::MidpointAwayFromZero,
        )
    }

    /// Parse a caller-supplied decimal. Digits beyond `SCALE` round half-up.
    pub fn from_display(value: Decimal, currency: Currency) -> DomainResult<Money> {
        let rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        let shift = SCALE - rounded.scale();
        let scaled = rounded
            .mantissa()
            .checked_mul(10_i128.pow(shift))
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Self::from_scaled(narrow(scaled)?, currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency.code(), self.display_amount())
    }
}

/// A percentage held as a fixed-point rational: units of 1/10,000 of a percent.
///
/// `12.5%` is `Percentage::from_units(125_000)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(i64);

impl ValueObject for Percentage {}

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const HUNDRED: Percentage = Percentage(100 * PERCENT_SCALE);

    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// A whole-number percentage, e.g. `Percentage::whole(20)` for 20%.
    pub const fn whole(percent: i64) -> Self {
        Self(percent * PERCENT_SCALE)
    }

    /// Parse a decimal percent value (`12.5` → 12.5%). Must lie in `[0, 100]`.
    pub fn from_decimal(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percentage must be within 0..=100, got {value}"
            )));
        }
        let rounded = value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
        let units = rounded.mantissa() * 10_i128.pow(4 - rounded.scale());
        Ok(Self(narrow(units)?))
    }

    pub const fn units(&self) -> i64 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.0 as i128, 4).normalize()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_decimal())
    }
}
