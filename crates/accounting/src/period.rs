//! Calendar-month accounting periods.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use talentbill_core::{Currency, DomainError, DomainResult, Money, StatementId, ValueObject};

use crate::ledger::LedgerTransaction;
use crate::statement::MonthlyStatement;

/// `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodId {
    year: i32,
    month: u32,
}

impl ValueObject for PeriodId {}

impl PeriodId {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) || !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "invalid accounting period {year}-{month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Half-open UTC range `[first instant, first instant of next month)`.
    pub fn range(&self) -> DomainResult<(DateTime<Utc>, DateTime<Utc>)> {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .ok_or_else(|| DomainError::invariant("period start out of range"))?;
        let next = first
            .checked_add_months(Months::new(1))
            .ok_or_else(|| DomainError::invariant("period end out of range"))?;
        Ok((
            first.and_time(chrono::NaiveTime::MIN).and_utc(),
            next.and_time(chrono::NaiveTime::MIN).and_utc(),
        ))
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("period id must be YYYY-MM, got {s:?}"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for PeriodId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeriodId> for String {
    fn from(id: PeriodId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodState {
    Open,
    Closed,
}

/// Statement totals for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub currency: Currency,
    pub gross_sales: Money,
    pub agency_commission: Money,
    pub processor_commission: Money,
    pub client_payout: Money,
    pub agency_net: Money,
    pub sales_count: u64,
    pub statement_count: u32,
}

impl PeriodTotals {
    pub fn empty(currency: Currency) -> Self {
        Self {
            currency,
            gross_sales: Money::zero(currency),
            agency_commission: Money::zero(currency),
            processor_commission: Money::zero(currency),
            client_payout: Money::zero(currency),
            agency_net: Money::zero(currency),
            sales_count: 0,
            statement_count: 0,
        }
    }

    fn add(&mut self, s: &MonthlyStatement) -> DomainResult<()> {
        self.gross_sales = self.gross_sales.add(&s.gross_sales)?;
        self.agency_commission = self.agency_commission.add(&s.agency_commission)?;
        self.processor_commission = self.processor_commission.add(&s.processor_commission)?;
        self.client_payout = self.client_payout.add(&s.client_payout)?;
        self.agency_net = self.agency_net.add(&s.agency_net)?;
        self.sales_count += u64::from(s.sales_count);
        self.statement_count += 1;
        Ok(())
    }
}

/// Summary of a month. Once `CLOSED` it is never modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedPeriod {
    pub id: PeriodId,
    pub state: PeriodState,
    /// One entry per currency that had statements, ordered by currency.
    pub totals: Vec<PeriodTotals>,
    pub statement_ids: Vec<StatementId>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Ledger transfers written when the period closed, one per currency.
    pub transfers: Vec<LedgerTransaction>,
}

impl ConsolidatedPeriod {
    pub fn open(id: PeriodId) -> Self {
        Self {
            id,
            state: PeriodState::Open,
            totals: Vec::new(),
            statement_ids: Vec::new(),
            closed_at: None,
            transfers: Vec::new(),
        }
    }

    /// Aggregate statements into an `OPEN` summary.
    pub fn aggregate<'a>(
        id: PeriodId,
        statements: impl IntoIterator<Item = &'a MonthlyStatement>,
    ) -> DomainResult<Self> {
        let mut period = Self::open(id);
        for statement in statements {
            if statement.period != id {
                return Err(DomainError::invariant(format!(
                    "statement {} belongs to {}, not {id}",
                    statement.id, statement.period
                )));
            }
            let currency = statement.currency();
            let idx = match period.totals.iter().position(|t| t.currency == currency) {
                Some(idx) => idx,
                None => {
                    period.totals.push(PeriodTotals::empty(currency));
                    period.totals.len() - 1
                }
            };
            period.totals[idx].add(statement)?;
            period.statement_ids.push(statement.id);
        }
        period.totals.sort_by_key(|t| t.currency);
        Ok(period)
    }

    pub fn is_closed(&self) -> bool {
        self.state == PeriodState::Closed
    }

    pub fn totals_for(&self, currency: Currency) -> Option<&PeriodTotals> {
        self.totals.iter().find(|t| t.currency == currency)
    }

    /// Currencies that need a ledger consolidation on close.
    pub fn currencies(&self) -> Vec<Currency> {
        self.totals.iter().map(|t| t.currency).collect()
    }

    pub fn close(
        &mut self,
        closed_at: DateTime<Utc>,
        transfers: Vec<LedgerTransaction>,
    ) -> DomainResult<()> {
        if self.is_closed() {
            return Err(DomainError::PeriodAlreadyClosed(self.id.to_string()));
        }
        self.state = PeriodState::Closed;
        self.closed_at = Some(closed_at);
        self.transfers = transfers;
        Ok(())
    }
}
