//! Invoicing domain module.
//!
//! Billing periods and their cut dates, human-facing invoice numbers, and the
//! invoice state machine, implemented purely as deterministic domain logic
//! (no IO, no clock reads, no storage).

pub mod invoice;
pub mod number;
pub mod payment;
pub mod period;

pub use invoice::{
    ActivateInvoice, ApplyPayment, CancelInvoice, CreateInvoice, Invoice, InvoiceActivated,
    InvoiceCancelled, InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceMarkedOverdue,
    InvoiceState, LineItem, LineItemInput, MarkOverdue, PaymentApplied,
};
pub use number::InvoiceNumber;
pub use payment::{Payment, PaymentMethod};
pub use period::{BillingPeriod, PeriodBoundary, PeriodCalculator, PeriodHalf};
