//! Infrastructure layer: stores, services, scheduling, and configuration.

pub mod collaborators;
pub mod config;
pub mod consolidation;
pub mod ledger_book;
pub mod lifecycle;
pub mod numbering;
pub mod period_locks;
pub mod scheduler;
pub mod service;
pub mod statements;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use collaborators::{
    CollaboratorError, ContractDirectory, InMemoryContractDirectory, InMemorySalesSource,
    NotificationBus, NotificationEnvelope, NotificationEvent, Notifier, SalesSource,
};
pub use config::{BillingConfig, ConfigError};
pub use consolidation::PeriodConsolidator;
pub use ledger_book::LedgerBook;
pub use lifecycle::{
    BatchFailure, BatchReport, InvoiceLifecycle, ManualInvoiceRequest, PaymentRequest,
};
pub use numbering::{InvoiceNumberAllocator, MAX_ALLOCATION_ATTEMPTS};
pub use period_locks::PeriodLocks;
pub use scheduler::{ActivationScheduler, SchedulerHandle, SchedulerStats, TickReport};
pub use service::{BillingService, BillingStores, Collaborators, InMemoryBilling};
pub use statements::FinancialStatementEngine;
