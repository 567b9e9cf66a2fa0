use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use talentbill_core::{ClientId, ContractId, Currency, DomainError, DomainResult, Money, Percentage};

use crate::scale::CommissionScale;

/// How often a client is invoiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCadence {
    Monthly,
    SemiMonthly,
}

/// Discriminant of [`CommissionTerms`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommissionType {
    Flat,
    Tiered,
}

/// How the agency's share of a client's sales is determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum CommissionTerms {
    Flat { percentage: Percentage },
    Tiered { scale: CommissionScale },
}

impl CommissionTerms {
    pub fn commission_type(&self) -> CommissionType {
        match self {
            CommissionTerms::Flat { .. } => CommissionType::Flat,
            CommissionTerms::Tiered { .. } => CommissionType::Tiered,
        }
    }
}

/// A signed agreement with a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub client_id: ClientId,
    pub terms: CommissionTerms,
    pub cadence: BillingCadence,
    /// Amount charged per billing period by scheduled invoices.
    pub period_fee: Money,
    /// Days between a period's cut date and its invoice due date.
    pub grace_period_days: u32,
    pub signed_at: DateTime<Utc>,
}

impl Contract {
    pub fn new(
        client_id: ClientId,
        terms: CommissionTerms,
        cadence: BillingCadence,
        period_fee: Money,
        grace_period_days: u32,
        signed_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if period_fee.is_negative() {
            return Err(DomainError::validation("contract period fee cannot be negative"));
        }
        if let CommissionTerms::Flat { percentage } = &terms {
            if *percentage < Percentage::ZERO || *percentage > Percentage::HUNDRED {
                return Err(DomainError::validation(format!(
                    "flat commission {percentage} is outside 0..=100%"
                )));
            }
        }
        // Tier bounds are read in the scale's currency; sales are billed in the fee's.
        if let CommissionTerms::Tiered { scale } = &terms {
            if scale.currency() != period_fee.currency() {
                return Err(DomainError::CurrencyMismatch {
                    left: period_fee.currency(),
                    right: scale.currency(),
                });
            }
        }
        Ok(Self {
            id: ContractId::new(),
            client_id,
            terms,
            cadence,
            period_fee,
            grace_period_days,
            signed_at,
        })
    }

    pub fn commission_type(&self) -> CommissionType {
        self.terms.commission_type()
    }

    /// Billing currency: the currency the period fee is charged in.
    pub fn currency(&self) -> Currency {
        self.period_fee.currency()
    }

    /// The contract in force for a client: the most recently signed one wins.
    pub fn effective<'a>(contracts: impl IntoIterator<Item = &'a Contract>) -> Option<&'a Contract> {
        contracts.into_iter().max_by_key(|c| c.signed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    use crate::scale::CommissionTier;

    fn flat(pct: i64, signed_at: DateTime<Utc>) -> Contract {
        Contract::new(
            ClientId::new(),
            CommissionTerms::Flat {
                percentage: Percentage::whole(pct),
            },
            BillingCadence::Monthly,
            Money::from_units(100, Currency::Usd).unwrap(),
            5,
            signed_at,
        )
        .unwrap()
    }

    #[test]
    fn latest_signed_contract_wins() {
        let older = flat(10, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let newer = flat(20, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let all = [newer.clone(), older];

        assert_eq!(Contract::effective(&all).unwrap().id, newer.id);
        assert!(Contract::effective(&[]).is_none());
    }

    #[test]
    fn rejects_negative_fee_and_out_of_range_rate() {
        let fee = Money::from_units(-1, Currency::Usd).unwrap();
        let err = Contract::new(
            ClientId::new(),
            CommissionTerms::Flat {
                percentage: Percentage::whole(10),
            },
            BillingCadence::Monthly,
            fee,
            5,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Contract::new(
            ClientId::new(),
            CommissionTerms::Flat {
                percentage: Percentage::whole(101),
            },
            BillingCadence::Monthly,
            Money::zero(Currency::Usd),
            5,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn tiered_scale_must_match_fee_currency() {
        let scale = CommissionScale::new(
            "cop volume",
            Currency::Cop,
            vec![CommissionTier::new(Decimal::ZERO, None, Percentage::whole(30))],
        )
        .unwrap();
        let err = Contract::new(
            ClientId::new(),
            CommissionTerms::Tiered { scale: scale.clone() },
            BillingCadence::Monthly,
            Money::from_units(100, Currency::Usd).unwrap(),
            5,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::CurrencyMismatch {
                left: Currency::Usd,
                right: Currency::Cop,
            }
        );

        let contract = Contract::new(
            ClientId::new(),
            CommissionTerms::Tiered { scale },
            BillingCadence::Monthly,
            Money::from_units(100_000, Currency::Cop).unwrap(),
            5,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(contract.currency(), Currency::Cop);
    }
}
