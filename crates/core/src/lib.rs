//! `talentbill-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error model, and the fixed-point money types every other
//! crate computes with.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{ClientId, ContractId, InvoiceId, PaymentId, SaleId, StatementId};
pub use money::{Currency, CurrencyConfig, Money, Percentage, SCALE, SCALE_FACTOR};
pub use value_object::ValueObject;
