//! Accounting module: revenue ledger, monthly statements, and period summaries.
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns.

pub mod ledger;
pub mod period;
pub mod statement;

pub use ledger::{
    LedgerCounters, LedgerLog, LedgerReason, LedgerState, LedgerTransaction, Pool,
    TransactionKind,
};
pub use period::{ConsolidatedPeriod, PeriodId, PeriodState, PeriodTotals};
pub use statement::{MonthlyStatement, SaleRecord, StatementInput, gross_sales};
