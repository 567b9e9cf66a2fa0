//! Billing periods and cut dates.
//!
//! The cut date is the day a period's work becomes invoiceable. Scheduled
//! invoices stay in `TRACKING` until it arrives, so these rules decide when
//! money is first owed:
//!
//! - `SEMI_MONTHLY`, day 1–15: first half, cut on the 16th of the same month.
//! - `SEMI_MONTHLY`, day 16–end: second half, cut on the 1st of the next month.
//! - `MONTHLY`: cut on the 1st of the next month.

use core::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use talentbill_contracts::BillingCadence;
use talentbill_core::{DomainError, DomainResult, ValueObject};

/// Day of month that closes the first half of a semi-monthly period.
const FIRST_HALF_LAST_DAY: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodHalf {
    First,
    Second,
}

impl PeriodHalf {
    pub fn number(&self) -> u8 {
        match self {
            PeriodHalf::First => 1,
            PeriodHalf::Second => 2,
        }
    }
}

/// `{year, month, half?}`. Monthly periods have no half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u32,
    pub half: Option<PeriodHalf>,
}

impl ValueObject for BillingPeriod {}

fn first_of_month(year: i32, month: u32) -> DomainResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| DomainError::validation(format!("invalid billing month {year}-{month}")))
}

fn first_of_next_month(date: NaiveDate) -> DomainResult<NaiveDate> {
    date.with_day(1)
        .and_then(|d| d.checked_add_months(Months::new(1)))
        .ok_or_else(|| DomainError::invariant("date out of range"))
}

impl BillingPeriod {
    pub fn monthly(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            half: None,
        }
    }

    pub fn semi_monthly(year: i32, month: u32, half: PeriodHalf) -> Self {
        Self {
            year,
            month,
            half: Some(half),
        }
    }

    /// First calendar day covered by the period.
    pub fn start_date(&self) -> DomainResult<NaiveDate> {
        let first = first_of_month(self.year, self.month)?;
        match self.half {
            Some(PeriodHalf::Second) => first
                .checked_add_days(Days::new(FIRST_HALF_LAST_DAY as u64))
                .ok_or_else(|| DomainError::invariant("date out of range")),
            _ => Ok(first),
        }
    }

    /// Last calendar day covered by the period (inclusive).
    pub fn end_date(&self) -> DomainResult<NaiveDate> {
        let first = first_of_month(self.year, self.month)?;
        match self.half {
            Some(PeriodHalf::First) => first
                .with_day(FIRST_HALF_LAST_DAY)
                .ok_or_else(|| DomainError::invariant("date out of range")),
            _ => first_of_next_month(first)?
                .pred_opt()
                .ok_or_else(|| DomainError::invariant("date out of range")),
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)?;
        if let Some(half) = self.half {
            write!(f, "-H{}", half.number())?;
        }
        Ok(())
    }
}

/// A period plus the date its invoice becomes billable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBoundary {
    pub period: BillingPeriod,
    pub cut_date: NaiveDate,
}

/// Pure cut-date rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeriodCalculator;

impl PeriodCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn boundary(
        &self,
        cadence: BillingCadence,
        reference: NaiveDate,
    ) -> DomainResult<PeriodBoundary> {
        let (year, month, day) = (reference.year(), reference.month(), reference.day());
        match cadence {
            BillingCadence::Monthly => Ok(PeriodBoundary {
                period: BillingPeriod::monthly(year, month),
                cut_date: first_of_next_month(reference)?,
            }),
            BillingCadence::SemiMonthly if day <= FIRST_HALF_LAST_DAY => {
                let cut_date = reference
                    .with_day(FIRST_HALF_LAST_DAY + 1)
                    .ok_or_else(|| DomainError::invariant("date out of range"))?;
                Ok(PeriodBoundary {
                    period: BillingPeriod::semi_monthly(year, month, PeriodHalf::First),
                    cut_date,
                })
            }
            BillingCadence::SemiMonthly => Ok(PeriodBoundary {
                period: BillingPeriod::semi_monthly(year, month, PeriodHalf::Second),
                cut_date: first_of_next_month(reference)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn semi_monthly_first_half_cuts_on_sixteenth() {
        let b = PeriodCalculator::new()
            .boundary(BillingCadence::SemiMonthly, date(2025, 10, 10))
            .unwrap();
        assert_eq!(b.period, BillingPeriod::semi_monthly(2025, 10, PeriodHalf::First));
        assert_eq!(b.cut_date, date(2025, 10, 16));

        let edge = PeriodCalculator::new()
            .boundary(BillingCadence::SemiMonthly, date(2025, 10, 15))
            .unwrap();
        assert_eq!(edge.period.half, Some(PeriodHalf::First));
    }

    #[test]
    fn semi_monthly_second_half_cuts_on_first_of_next_month() {
        let b = PeriodCalculator::new()
            .boundary(BillingCadence::SemiMonthly, date(2025, 12, 16))
            .unwrap();
        assert_eq!(b.period, BillingPeriod::semi_monthly(2025, 12, PeriodHalf::Second));
        assert_eq!(b.cut_date, date(2026, 1, 1));
    }

    #[test]
    fn monthly_cuts_on_first_of_next_month() {
        let b = PeriodCalculator::new()
            .boundary(BillingCadence::Monthly, date(2024, 1, 31))
            .unwrap();
        assert_eq!(b.period, BillingPeriod::monthly(2024, 1));
        assert_eq!(b.cut_date, date(2024, 2, 1));

        let first = PeriodCalculator::new()
            .boundary(BillingCadence::Monthly, date(2024, 3, 1))
            .unwrap();
        assert_eq!(first.cut_date, date(2024, 4, 1));
    }

    #[test]
    fn period_ranges_and_display() {
        let h1 = BillingPeriod::semi_monthly(2024, 2, PeriodHalf::First);
        assert_eq!(h1.start_date().unwrap(), date(2024, 2, 1));
        assert_eq!(h1.end_date().unwrap(), date(2024, 2, 15));
        assert_eq!(h1.to_string(), "2024-02-H1");

        let h2 = BillingPeriod::semi_monthly(2024, 2, PeriodHalf::Second);
        assert_eq!(h2.start_date().unwrap(), date(2024, 2, 16));
        assert_eq!(h2.end_date().unwrap(), date(2024, 2, 29));

        let m = BillingPeriod::monthly(2025, 11);
        assert_eq!(m.end_date().unwrap(), date(2025, 11, 30));
        assert_eq!(m.to_string(), "2025-11");
    }
}
