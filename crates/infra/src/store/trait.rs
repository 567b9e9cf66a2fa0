use thiserror::Error;

use talentbill_accounting::{ConsolidatedPeriod, MonthlyStatement, PeriodId};
use talentbill_core::{ClientId, DomainError, ExpectedVersion, InvoiceId};
use talentbill_invoicing::{BillingPeriod, Invoice, InvoiceNumber, InvoiceState, Payment};

/// Storage-level failures.
///
/// The duplicate variants are the uniqueness backstops: callers treat
/// `DuplicateNumber` as an allocation collision and `DuplicatePeriod` as the
/// domain `DuplicatePeriod` error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invoice number already taken: {0}")]
    DuplicateNumber(String),

    #[error("active invoice already exists for client {client} in period {period}")]
    DuplicatePeriod { client: String, period: String },

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("optimistic concurrency conflict (expected: {expected:?}, actual: {actual})")]
    Concurrency {
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => DomainError::NotFound(what),
            StoreError::DuplicatePeriod { client, period } => {
                DomainError::DuplicatePeriod { client, period }
            }
            StoreError::DuplicateNumber(number) => {
                DomainError::conflict(format!("invoice number {number} already taken"))
            }
            StoreError::AlreadyExists(what) => DomainError::conflict(format!("{what} already exists")),
            StoreError::Concurrency { .. } => DomainError::conflict(err.to_string()),
            StoreError::Storage(msg) => DomainError::invariant(format!("storage failure: {msg}")),
        }
    }
}

/// Read side used by the number allocator.
pub trait InvoiceNumberIndex: Send + Sync {
    /// Highest sequential number issued for `prefix`/`year`, ignoring fallbacks.
    fn highest_sequence(&self, prefix: &str, year: i32) -> Result<Option<u32>, StoreError>;

    fn number_exists(&self, number: &InvoiceNumber) -> Result<bool, StoreError>;
}

/// Invoices table. Updated in place for state and balance fields.
///
/// Implementations must enforce two unique constraints on write: the invoice
/// number globally, and `(client, period)` among non-cancelled invoices.
pub trait InvoiceStore: InvoiceNumberIndex {
    fn insert(&self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Replace a stored invoice if its stored version matches `expected`.
    fn update(&self, invoice: &Invoice, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    fn find_active_for_period(
        &self,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<Option<Invoice>, StoreError>;

    fn list_by_state(&self, state: InvoiceState) -> Result<Vec<Invoice>, StoreError>;

    fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, StoreError>;
}

/// Payments table (insert-only).
pub trait PaymentStore: Send + Sync {
    fn insert(&self, payment: &Payment) -> Result<(), StoreError>;

    fn list_for_invoice(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>, StoreError>;
}

/// Monthly statements, one per `(client, period)`.
pub trait StatementStore: Send + Sync {
    fn upsert(&self, statement: &MonthlyStatement) -> Result<(), StoreError>;

    fn get(
        &self,
        client_id: ClientId,
        period: PeriodId,
    ) -> Result<Option<MonthlyStatement>, StoreError>;

    fn list_for_period(&self, period: PeriodId) -> Result<Vec<MonthlyStatement>, StoreError>;
}

/// Consolidated period summaries.
pub trait PeriodStore: Send + Sync {
    fn get(&self, id: PeriodId) -> Result<Option<ConsolidatedPeriod>, StoreError>;

    /// Insert or replace. Replacing a `CLOSED` period is rejected.
    fn save(&self, period: &ConsolidatedPeriod) -> Result<(), StoreError>;
}
