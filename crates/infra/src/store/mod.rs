//! Persistence boundary for the billing core.
//!
//! Logical tables: `invoices`, `payments`, `monthly_statements` and
//! `consolidated_periods`. The ledger log lives in [`crate::ledger_book`].
//! Only in-memory implementations ship here; a durable backend implements the
//! same traits, including the unique constraints documented on
//! [`InvoiceStore`].

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{
    InMemoryInvoiceStore, InMemoryPaymentStore, InMemoryPeriodStore, InMemoryStatementStore,
};
pub use r#trait::{
    InvoiceNumberIndex, InvoiceStore, PaymentStore, PeriodStore, StatementStore, StoreError,
};
