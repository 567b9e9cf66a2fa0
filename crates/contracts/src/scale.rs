//! Tiered commission scales.
//!
//! A scale is an ordered list of brackets over the client's monthly sales
//! (expressed in the scale currency's display units). Brackets must partition
//! `[0, ∞)`: the first starts at zero, the last is unbounded, and each next
//! `min` sits exactly one display step above the previous `max`. Sales values
//! are always rounded to display precision before lookup, so a one-step gap
//! contains no representable value.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use talentbill_core::{Currency, DomainError, DomainResult, Percentage};

/// One bracket of a scale. `max_usd == None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub min_usd: Decimal,
    pub max_usd: Option<Decimal>,
    pub percentage: Percentage,
}

impl CommissionTier {
    pub fn new(min_usd: Decimal, max_usd: Option<Decimal>, percentage: Percentage) -> Self {
        Self {
            min_usd,
            max_usd,
            percentage,
        }
    }

    pub fn matches(&self, value: Decimal) -> bool {
        self.min_usd <= value && self.max_usd.is_none_or(|max| value <= max)
    }
}

/// Validated, ordered set of tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScale", into = "RawScale")]
pub struct CommissionScale {
    name: String,
    currency: Currency,
    tiers: Vec<CommissionTier>,
}

#[derive(Serialize, Deserialize)]
struct RawScale {
    name: String,
    currency: Currency,
    tiers: Vec<CommissionTier>,
}

impl TryFrom<RawScale> for CommissionScale {
    type Error = DomainError;

    fn try_from(raw: RawScale) -> Result<Self, Self::Error> {
        CommissionScale::new(raw.name, raw.currency, raw.tiers)
    }
}

impl From<CommissionScale> for RawScale {
    fn from(scale: CommissionScale) -> Self {
        RawScale {
            name: scale.name,
            currency: scale.currency,
            tiers: scale.tiers,
        }
    }
}

impl CommissionScale {
    pub fn new(
        name: impl Into<String>,
        currency: Currency,
        tiers: Vec<CommissionTier>,
    ) -> DomainResult<Self> {
        let step = Decimal::new(1, currency.config().display_decimals);
        let decimals = currency.config().display_decimals;

        let Some(first) = tiers.first() else {
            return Err(DomainError::validation("commission scale needs at least one tier"));
        };
        if !first.min_usd.is_zero() {
            return Err(DomainError::validation("first commission tier must start at 0"));
        }

        for (idx, tier) in tiers.iter().enumerate() {
            if tier.percentage < Percentage::ZERO || tier.percentage > Percentage::HUNDRED {
                return Err(DomainError::validation(format!(
                    "tier {idx}: percentage {} outside 0..=100%",
                    tier.percentage
                )));
            }
            let too_precise = std::iter::once(tier.min_usd)
                .chain(tier.max_usd)
                .any(|b| b.normalize().scale() > decimals);
            if too_precise {
                return Err(DomainError::validation(format!(
                    "tier {idx}: bounds must use at most {decimals} decimals"
                )));
            }

            let is_last = idx + 1 == tiers.len();
            match (tier.max_usd, is_last) {
                (None, true) => {}
                (None, false) => {
                    return Err(DomainError::validation(format!(
                        "tier {idx}: only the last tier may be unbounded"
                    )));
                }
                (Some(_), true) => {
                    return Err(DomainError::validation("last commission tier must be unbounded"));
                }
                (Some(max), false) => {
                    if max < tier.min_usd {
                        return Err(DomainError::validation(format!(
                            "tier {idx}: max {max} is below min {}",
                            tier.min_usd
                        )));
                    }
                    let next_min = tiers[idx + 1].min_usd;
                    if next_min != max + step {
                        return Err(DomainError::validation(format!(
                            "tier {}: min {next_min} must follow previous max {max} by {step}",
                            idx + 1
                        )));
                    }
                }
            }
        }

        Ok(Self {
            name: name.into(),
            currency,
            tiers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn tiers(&self) -> &[CommissionTier] {
        &self.tiers
    }

    /// First tier whose bracket contains `value`.
    pub fn find_tier(&self, value: Decimal) -> Option<&CommissionTier> {
        self.tiers.iter().find(|t| t.matches(value))
    }

    /// Tier used when no bracket matches.
    pub fn fallback_tier(&self) -> &CommissionTier {
        // Construction guarantees at least one tier.
        &self.tiers[self.tiers.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(units: i64, cents: i64) -> Decimal {
        Decimal::new(units * 100 + cents, 2)
    }

    fn standard_scale() -> CommissionScale {
        CommissionScale::new(
            "standard",
            Currency::Usd,
            vec![
                CommissionTier::new(dec(0, 0), Some(dec(999, 99)), Percentage::whole(40)),
                CommissionTier::new(dec(1000, 0), Some(dec(4999, 99)), Percentage::whole(35)),
                CommissionTier::new(dec(5000, 0), None, Percentage::whole(30)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn finds_bracket_on_boundaries() {
        let scale = standard_scale();
        assert_eq!(scale.find_tier(dec(0, 0)).unwrap().percentage, Percentage::whole(40));
        assert_eq!(scale.find_tier(dec(999, 99)).unwrap().percentage, Percentage::whole(40));
        assert_eq!(scale.find_tier(dec(1000, 0)).unwrap().percentage, Percentage::whole(35));
        assert_eq!(scale.find_tier(dec(1_000_000, 0)).unwrap().percentage, Percentage::whole(30));
    }

    #[test]
    fn rejects_gaps_overlaps_and_bounded_tail() {
        let gap = CommissionScale::new(
            "gap",
            Currency::Usd,
            vec![
                CommissionTier::new(dec(0, 0), Some(dec(100, 0)), Percentage::whole(10)),
                CommissionTier::new(dec(200, 0), None, Percentage::whole(5)),
            ],
        );
        assert!(gap.is_err());

        let overlap = CommissionScale::new(
            "overlap",
            Currency::Usd,
            vec![
                CommissionTier::new(dec(0, 0), Some(dec(100, 0)), Percentage::whole(10)),
                CommissionTier::new(dec(50, 0), None, Percentage::whole(5)),
            ],
        );
        assert!(overlap.is_err());

        let bounded = CommissionScale::new(
            "bounded",
            Currency::Usd,
            vec![CommissionTier::new(dec(0, 0), Some(dec(100, 0)), Percentage::whole(10))],
        );
        assert!(bounded.is_err());

        let offset = CommissionScale::new(
            "offset",
            Currency::Usd,
            vec![CommissionTier::new(dec(1, 0), None, Percentage::whole(10))],
        );
        assert!(offset.is_err());

        assert!(CommissionScale::new("empty", Currency::Usd, vec![]).is_err());
    }

    #[test]
    fn deserialization_revalidates() {
        let json = r#"{"name":"bad","currency":"USD","tiers":[{"min_usd":"5","max_usd":null,"percentage":100000}]}"#;
        assert!(serde_json::from_str::<CommissionScale>(json).is_err());

        let encoded = serde_json::to_string(&standard_scale()).unwrap();
        let decoded: CommissionScale = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, standard_scale());
    }

    proptest! {
        /// For any generated partition and any non-negative value, exactly one
        /// tier matches.
        #[test]
        fn exactly_one_tier_matches(
            widths in prop::collection::vec(1i64..1_000_000i64, 0..6),
            value_cents in 0i64..10_000_000_000i64,
        ) {
            let mut tiers = Vec::new();
            let mut min = 0i64;
            for w in &widths {
                let max = min + w;
                tiers.push(CommissionTier::new(
                    Decimal::new(min, 2),
                    Some(Decimal::new(max, 2)),
                    Percentage::whole(10),
                ));
                min = max + 1;
            }
            tiers.push(CommissionTier::new(Decimal::new(min, 2), None, Percentage::whole(5)));

            let scale = CommissionScale::new("generated", Currency::Usd, tiers).unwrap();
            let value = Decimal::new(value_cents, 2);
            let matching = scale.tiers().iter().filter(|t| t.matches(value)).count();
            prop_assert_eq!(matching, 1);
        }
    }
}
