use tracing::warn;

use talentbill_core::{DomainResult, Money, Percentage};

use crate::contract::{CommissionTerms, Contract};

/// Resolves the agency's commission percentage for a sales total.
///
/// Stateless: the result depends only on the contract terms and the amount.
/// The percentage is returned unapplied; callers take it through
/// `Money::multiply_by_ratio` so rounding stays uniform.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommissionCalculator;

impl CommissionCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn effective_percentage(
        &self,
        gross_sales: &Money,
        contract: &Contract,
    ) -> DomainResult<Percentage> {
        match &contract.terms {
            CommissionTerms::Flat { percentage } => Ok(*percentage),
            CommissionTerms::Tiered { scale } => {
                let value = gross_sales.to_display(&scale.currency().config())?;
                match scale.find_tier(value) {
                    Some(tier) => Ok(tier.percentage),
                    None => {
                        let fallback = scale.fallback_tier();
                        warn!(
                            contract_id = %contract.id,
                            scale = scale.name(),
                            %value,
                            fallback = %fallback.percentage,
                            "no commission tier matched sales value; using last tier"
                        );
                        Ok(fallback.percentage)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use talentbill_core::{ClientId, Currency, DomainError};

    use crate::contract::BillingCadence;
    use crate::scale::{CommissionScale, CommissionTier};

    fn contract(terms: CommissionTerms) -> Contract {
        Contract::new(
            ClientId::new(),
            terms,
            BillingCadence::Monthly,
            Money::zero(Currency::Usd),
            5,
            Utc::now(),
        )
        .unwrap()
    }

    fn tiered() -> Contract {
        let scale = CommissionScale::new(
            "volume",
            Currency::Usd,
            vec![
                CommissionTier::new(Decimal::ZERO, Some(Decimal::new(99_999, 2)), Percentage::whole(40)),
                CommissionTier::new(Decimal::new(1_000, 0), None, Percentage::whole(30)),
            ],
        )
        .unwrap();
        contract(CommissionTerms::Tiered { scale })
    }

    fn usd(units: i64) -> Money {
        Money::from_units(units, Currency::Usd).unwrap()
    }

    #[test]
    fn flat_rate_is_returned_directly() {
        let c = contract(CommissionTerms::Flat {
            percentage: Percentage::whole(25),
        });
        let pct = CommissionCalculator::new().effective_percentage(&usd(12_345), &c).unwrap();
        assert_eq!(pct, Percentage::whole(25));
    }

    #[test]
    fn tiered_rate_follows_sales_volume() {
        let calc = CommissionCalculator::new();
        let c = tiered();
        assert_eq!(calc.effective_percentage(&usd(500), &c).unwrap(), Percentage::whole(40));
        assert_eq!(calc.effective_percentage(&usd(1_000), &c).unwrap(), Percentage::whole(30));
    }

    #[test]
    fn sub_cent_sales_round_into_a_bracket() {
        // 999.995 displays as 1000.00 and lands in the upper tier.
        let amount = Money::from_scaled(99_999_500, Currency::Usd);
        let pct = CommissionCalculator::new().effective_percentage(&amount, &tiered()).unwrap();
        assert_eq!(pct, Percentage::whole(30));
    }

    #[test]
    fn negative_sales_fall_back_to_last_tier() {
        let amount = usd(-10);
        let pct = CommissionCalculator::new().effective_percentage(&amount, &tiered()).unwrap();
        assert_eq!(pct, Percentage::whole(30));
    }

    #[test]
    fn tiered_scale_rejects_other_currency() {
        let cop = Money::from_units(10, Currency::Cop).unwrap();
        let err = CommissionCalculator::new().effective_percentage(&cop, &tiered()).unwrap_err();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
    }
}
