//! Domain error model.

use thiserror::Error;

use crate::money::Currency;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere and are
/// mapped into one of these kinds at the service boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Binary money operation over two different currencies.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// Money division by a zero count.
    #[error("division by zero")]
    DivisionByZero,

    /// A non-cancelled invoice already exists for the client and billing period.
    #[error("an active invoice already exists for client {client} in period {period}")]
    DuplicatePeriod { client: String, period: String },

    /// Payment attempted against a paid or cancelled invoice.
    #[error("invoice {0} is already closed")]
    InvoiceAlreadyClosed(String),

    /// Payment larger than the invoice's outstanding balance.
    #[error("payment of {attempted} exceeds outstanding balance {outstanding}")]
    OverpaymentRejected {
        attempted: String,
        outstanding: String,
    },

    /// The allocator hit its retry ceiling. Recovered internally via the
    /// timestamp fallback; only surfaced by the allocator's inner loop.
    #[error("invoice number allocation exhausted after {attempts} attempts")]
    NumberAllocationExhausted { attempts: u32 },

    /// Statement recompute against a period that has been consolidated.
    #[error("period {0} is closed")]
    PeriodClosed(String),

    /// Second close attempt for a period.
    #[error("period {0} is already closed")]
    PeriodAlreadyClosed(String),

    /// Close attempted while some active clients have no statement.
    #[error("period {period} is missing statements for {} client(s)", missing.len())]
    PeriodIncomplete { period: String, missing: Vec<String> },

    /// Ledger consolidation requested twice for the same period.
    #[error("ledger already consolidated for period {0}")]
    AlreadyConsolidated(String),

    /// A state machine transition that the current state does not allow.
    #[error("invalid transition from {from} via {action}")]
    InvalidTransition { from: String, action: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Debug, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: format!("{from:?}"),
            action: action.into(),
        }
    }
}
