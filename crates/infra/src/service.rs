//! Inbound facade over the billing core.
//!
//! Callers hand in already-parsed values (ids, `Money`, calendar dates); this
//! layer wires the services together and routes each request to its owner.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use talentbill_accounting::{ConsolidatedPeriod, LedgerState, MonthlyStatement, PeriodId};
use talentbill_core::{ClientId, Currency, DomainError, DomainResult, InvoiceId};
use talentbill_events::InMemoryEventBus;
use talentbill_invoicing::{Invoice, Payment};

use crate::collaborators::{
    ContractDirectory, InMemoryContractDirectory, InMemorySalesSource, NotificationEnvelope,
    Notifier, SalesSource,
};
use crate::config::BillingConfig;
use crate::consolidation::PeriodConsolidator;
use crate::ledger_book::LedgerBook;
use crate::lifecycle::{BatchReport, InvoiceLifecycle, ManualInvoiceRequest, PaymentRequest};
use crate::period_locks::PeriodLocks;
use crate::scheduler::ActivationScheduler;
use crate::statements::FinancialStatementEngine;
use crate::store::{
    InMemoryInvoiceStore, InMemoryPaymentStore, InMemoryPeriodStore, InMemoryStatementStore,
    InvoiceStore, PaymentStore, PeriodStore, StatementStore,
};

/// Persistence handles owned by the billing core.
#[derive(Clone)]
pub struct BillingStores {
    pub invoices: Arc<dyn InvoiceStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub statements: Arc<dyn StatementStore>,
    pub periods: Arc<dyn PeriodStore>,
    pub ledger: Arc<LedgerBook>,
}

impl BillingStores {
    pub fn in_memory() -> Self {
        Self {
            invoices: InMemoryInvoiceStore::arc(),
            payments: Arc::new(InMemoryPaymentStore::new()),
            statements: Arc::new(InMemoryStatementStore::new()),
            periods: Arc::new(InMemoryPeriodStore::new()),
            ledger: Arc::new(LedgerBook::new()),
        }
    }
}

/// Read-only collaborators the core consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub sales: Arc<dyn SalesSource>,
    pub contracts: Arc<dyn ContractDirectory>,
}

/// A fully in-memory service plus the handles used to feed and observe it.
pub struct InMemoryBilling {
    pub service: BillingService,
    pub sales: Arc<InMemorySalesSource>,
    pub contracts: Arc<InMemoryContractDirectory>,
    pub bus: Arc<InMemoryEventBus<NotificationEnvelope>>,
}

pub struct BillingService {
    config: BillingConfig,
    contracts: Arc<dyn ContractDirectory>,
    ledger: Arc<LedgerBook>,
    lifecycle: Arc<InvoiceLifecycle>,
    statements: FinancialStatementEngine,
    consolidator: PeriodConsolidator,
}

impl BillingService {
    pub fn new(
        config: BillingConfig,
        stores: BillingStores,
        collaborators: Collaborators,
        notifier: Notifier,
    ) -> Self {
        let lifecycle = Arc::new(InvoiceLifecycle::new(
            stores.invoices,
            stores.payments,
            notifier.clone(),
            config.invoice_prefix.clone(),
            config.grace_days,
        ));
        // Statement computation and period close share one lock per month.
        let locks = Arc::new(PeriodLocks::new());
        let statements = FinancialStatementEngine::new(
            collaborators.sales.clone(),
            collaborators.contracts.clone(),
            stores.statements.clone(),
            stores.periods.clone(),
            stores.ledger.clone(),
            locks.clone(),
            config.processor_fee,
        );
        let consolidator = PeriodConsolidator::new(
            collaborators.sales,
            stores.statements,
            stores.periods,
            stores.ledger.clone(),
            locks,
            notifier,
        );

        Self {
            config,
            contracts: collaborators.contracts,
            ledger: stores.ledger,
            lifecycle,
            statements,
            consolidator,
        }
    }

    pub fn in_memory(config: BillingConfig) -> InMemoryBilling {
        let sales = Arc::new(InMemorySalesSource::new());
        let contracts = Arc::new(InMemoryContractDirectory::new());
        let (notifier, bus) = Notifier::in_memory();
        let service = Self::new(
            config,
            BillingStores::in_memory(),
            Collaborators {
                sales: sales.clone(),
                contracts: contracts.clone(),
            },
            notifier,
        );
        InMemoryBilling {
            service,
            sales,
            contracts,
            bus,
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Scheduled invoice for the client's current contract.
    pub fn create_scheduled_invoice(
        &self,
        client_id: ClientId,
        reference_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        let contract = self
            .contracts
            .current_contract(client_id)?
            .ok_or_else(|| DomainError::not_found(format!("contract for client {client_id}")))?;
        self.lifecycle.create_scheduled(&contract, reference_date, now)
    }

    pub fn create_manual_invoice(
        &self,
        request: ManualInvoiceRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        self.lifecycle.create_manual(request, now)
    }

    pub fn record_payment(
        &self,
        invoice_id: InvoiceId,
        request: PaymentRequest,
    ) -> DomainResult<(Invoice, Payment)> {
        self.lifecycle.apply_payment(invoice_id, request)
    }

    pub fn cancel_invoice(
        &self,
        invoice_id: InvoiceId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        self.lifecycle.cancel(invoice_id, reason, now)
    }

    pub fn activate_due(&self, now: DateTime<Utc>) -> DomainResult<BatchReport> {
        self.lifecycle.activate_due(now)
    }

    pub fn mark_overdue_if_past_due(&self, now: DateTime<Utc>) -> DomainResult<BatchReport> {
        self.lifecycle.mark_overdue_if_past_due(now)
    }

    pub fn compute_statement(
        &self,
        client_id: ClientId,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<MonthlyStatement> {
        self.statements
            .compute(client_id, PeriodId::new(year, month)?, now)
    }

    pub fn close_period(
        &self,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<ConsolidatedPeriod> {
        self.consolidator.close_period(year, month, now)
    }

    pub fn get_ledger_state(&self, currency: Currency) -> DomainResult<LedgerState> {
        self.ledger.state(currency)
    }

    pub fn verify_ledger(&self) -> DomainResult<()> {
        self.ledger.verify()
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> DomainResult<Option<Invoice>> {
        self.lifecycle.get(invoice_id)
    }

    pub fn invoices_for_client(&self, client_id: ClientId) -> DomainResult<Vec<Invoice>> {
        self.lifecycle.invoices_for_client(client_id)
    }

    pub fn payments_for_invoice(&self, invoice_id: InvoiceId) -> DomainResult<Vec<Payment>> {
        self.lifecycle.payments_for(invoice_id)
    }

    pub fn statement(
        &self,
        client_id: ClientId,
        year: i32,
        month: u32,
    ) -> DomainResult<Option<MonthlyStatement>> {
        self.statements.get(client_id, PeriodId::new(year, month)?)
    }

    pub fn period(&self, year: i32, month: u32) -> DomainResult<Option<ConsolidatedPeriod>> {
        self.consolidator.get(PeriodId::new(year, month)?)
    }

    /// Scheduler driving this service's invoice lifecycle at the configured
    /// intervals.
    pub fn scheduler(&self) -> DomainResult<ActivationScheduler> {
        ActivationScheduler::new(
            self.lifecycle.clone(),
            self.config.activation_interval,
            self.config.overdue_interval,
        )
    }
}
