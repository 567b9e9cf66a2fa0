//! Monthly client statements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use talentbill_core::{ClientId, Currency, DomainError, DomainResult, Money, Percentage, SaleId, StatementId};

use crate::period::PeriodId;

/// One itemized sale as reported by the sales collaborator.
///
/// `kind` is opaque to billing; it is carried through for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: SaleId,
    pub client_id: ClientId,
    pub amount: Money,
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
}

/// Gross sales and count for the sales falling inside `period`.
pub fn gross_sales<'a>(
    currency: Currency,
    period: PeriodId,
    sales: impl IntoIterator<Item = &'a SaleRecord>,
) -> DomainResult<(Money, u32)> {
    let (start, end) = period.range()?;
    let mut gross = Money::zero(currency);
    let mut count = 0u32;
    for sale in sales {
        if sale.occurred_at < start || sale.occurred_at >= end {
            continue;
        }
        gross = gross.add(&sale.amount)?;
        count += 1;
    }
    Ok((gross, count))
}

/// Per-client, per-month financial split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyStatement {
    pub id: StatementId,
    pub client_id: ClientId,
    pub period: PeriodId,
    pub gross_sales: Money,
    pub agency_commission: Money,
    pub processor_commission: Money,
    pub client_payout: Money,
    pub agency_net: Money,
    pub sales_count: u32,
    pub commission_percentage: Percentage,
    pub processor_fee_percentage: Percentage,
    pub computed_at: DateTime<Utc>,
}

/// Inputs for [`MonthlyStatement::compute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInput {
    pub id: StatementId,
    pub client_id: ClientId,
    pub period: PeriodId,
    pub gross_sales: Money,
    pub sales_count: u32,
    pub commission_percentage: Percentage,
    pub processor_fee_percentage: Percentage,
    pub computed_at: DateTime<Utc>,
}

impl MonthlyStatement {
    /// Pure split of gross sales.
    ///
    /// The processor fee is taken from the agency's commission only; the
    /// client payout is never reduced by it.
    pub fn compute(input: StatementInput) -> DomainResult<Self> {
        if input.commission_percentage > Percentage::HUNDRED
            || input.processor_fee_percentage > Percentage::HUNDRED
        {
            return Err(DomainError::validation("percentages must not exceed 100%"));
        }

        let agency_commission = input.gross_sales.multiply_by_ratio(input.commission_percentage)?;
        let processor_commission =
            agency_commission.multiply_by_ratio(input.processor_fee_percentage)?;
        let client_payout = input.gross_sales.subtract(&agency_commission)?;
        let agency_net = agency_commission.subtract(&processor_commission)?;

        Ok(Self {
            id: input.id,
            client_id: input.client_id,
            period: input.period,
            gross_sales: input.gross_sales,
            agency_commission,
            processor_commission,
            client_payout,
            agency_net,
            sales_count: input.sales_count,
            commission_percentage: input.commission_percentage,
            processor_fee_percentage: input.processor_fee_percentage,
            computed_at: input.computed_at,
        })
    }

    pub fn currency(&self) -> Currency {
        self.gross_sales.currency()
    }
}
