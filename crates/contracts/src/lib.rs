//! Client contracts and commission terms.
//!
//! Pure domain logic: a contract says how a client is billed (cadence, fee,
//! grace period) and how the agency's commission is derived (flat rate or a
//! tiered scale). Nothing here performs IO.

pub mod calculator;
pub mod contract;
pub mod scale;

pub use calculator::CommissionCalculator;
pub use contract::{BillingCadence, CommissionTerms, CommissionType, Contract};
pub use scale::{CommissionScale, CommissionTier};
