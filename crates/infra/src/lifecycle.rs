//! Invoice lifecycle service.
//!
//! Loads invoices from the store, runs commands through the `Invoice`
//! aggregate, and writes them back under an optimistic version check. Batch
//! operations (`activate_due`, `mark_overdue_if_past_due`) re-check each
//! invoice's guard at execution time and isolate per-invoice failures, so the
//! scheduler can call them on every tick with any `now`.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info};

use talentbill_contracts::Contract;
use talentbill_core::{
    Aggregate, AggregateRoot, ClientId, ContractId, DomainError, DomainResult, ExpectedVersion,
    InvoiceId, Money,
};
use talentbill_invoicing::{
    ActivateInvoice, ApplyPayment, BillingPeriod, CancelInvoice, CreateInvoice, Invoice,
    InvoiceCommand, InvoiceNumber, InvoiceState, LineItemInput, MarkOverdue, Payment,
    PaymentMethod, PeriodCalculator,
};

use crate::collaborators::{NotificationEvent, Notifier};
use crate::numbering::InvoiceNumberAllocator;
use crate::store::{InvoiceStore, PaymentStore, StoreError};

/// Input for a manually issued invoice.
#[derive(Debug, Clone)]
pub struct ManualInvoiceRequest {
    pub client_id: ClientId,
    pub contract_id: Option<ContractId>,
    pub lines: Vec<LineItemInput>,
    pub discount: Money,
    pub issue_date: NaiveDate,
    /// Days until due; the configured grace period when absent.
    pub due_days: Option<u32>,
    /// When set, the one-invoice-per-period rule applies.
    pub period: Option<BillingPeriod>,
    pub notes: Option<String>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

/// A per-invoice failure inside a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub invoice_id: InvoiceId,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Invoices whose guard held and were examined.
    pub examined: usize,
    /// Invoices that changed state.
    pub transitioned: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    fn fail(&mut self, invoice_id: InvoiceId, err: &DomainError) {
        self.failures.push(BatchFailure {
            invoice_id,
            error: err.to_string(),
        });
    }
}

pub struct InvoiceLifecycle {
    invoices: Arc<dyn InvoiceStore>,
    payments: Arc<dyn PaymentStore>,
    allocator: InvoiceNumberAllocator<dyn InvoiceStore>,
    periods: PeriodCalculator,
    notifier: Notifier,
    default_grace_days: u32,
}

impl InvoiceLifecycle {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        payments: Arc<dyn PaymentStore>,
        notifier: Notifier,
        invoice_prefix: impl Into<String>,
        default_grace_days: u32,
    ) -> Self {
        let allocator = InvoiceNumberAllocator::new(invoices.clone(), invoice_prefix);
        Self {
            invoices,
            payments,
            allocator,
            periods: PeriodCalculator::new(),
            notifier,
            default_grace_days,
        }
    }

    /// Create the scheduled invoice for the period containing `reference`.
    ///
    /// Starts in `TRACKING` and is charged the contract's period fee; due date
    /// is the cut date plus the contract's grace period.
    pub fn create_scheduled(
        &self,
        contract: &Contract,
        reference: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        let boundary = self.periods.boundary(contract.cadence, reference)?;
        self.ensure_period_free(contract.client_id, boundary.period)?;

        let due_date = add_days(boundary.cut_date, contract.grace_period_days)?;
        let template = CreateInvoice {
            invoice_id: InvoiceId::new(),
            number: self.draft_number(),
            client_id: contract.client_id,
            contract_id: Some(contract.id),
            period: Some(boundary.period),
            lines: vec![LineItemInput {
                concept: format!("Management fee {}", boundary.period),
                quantity: 1,
                unit_price: contract.period_fee,
            }],
            discount: Money::zero(contract.currency()),
            issue_date: now.date_naive(),
            cut_date: boundary.cut_date,
            due_date,
            scheduled: true,
            notes: None,
            occurred_at: now,
        };

        let invoice = self.create(template, now)?;
        info!(
            invoice_id = %invoice.id_typed(),
            client_id = %contract.client_id,
            period = %boundary.period,
            cut_date = %boundary.cut_date,
            "scheduled invoice created"
        );
        Ok(invoice)
    }

    /// Create an invoice that is billable immediately (`PENDING`).
    pub fn create_manual(
        &self,
        request: ManualInvoiceRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        if let Some(period) = request.period {
            self.ensure_period_free(request.client_id, period)?;
        }

        let due_days = request.due_days.unwrap_or(self.default_grace_days);
        let due_date = add_days(request.issue_date, due_days)?;
        let template = CreateInvoice {
            invoice_id: InvoiceId::new(),
            number: self.draft_number(),
            client_id: request.client_id,
            contract_id: request.contract_id,
            period: request.period,
            lines: request.lines,
            discount: request.discount,
            issue_date: request.issue_date,
            cut_date: request.issue_date,
            due_date,
            scheduled: false,
            notes: request.notes,
            occurred_at: now,
        };

        let invoice = self.create(template, now)?;
        info!(
            invoice_id = %invoice.id_typed(),
            client_id = %request.client_id,
            total = %invoice.total(),
            "manual invoice created"
        );
        Ok(invoice)
    }

    /// Stand-in number carried by a command until allocation replaces it.
    fn draft_number(&self) -> InvoiceNumber {
        InvoiceNumber::sequential(self.allocator.prefix(), 0, 0)
    }

    /// Validate the command once, then allocate a number and insert.
    ///
    /// Numbers use the issue year. The insert is the allocation commit: a
    /// duplicate number is retried by the allocator and a duplicate period
    /// surfaces as `DuplicatePeriod`.
    fn create(&self, template: CreateInvoice, now: DateTime<Utc>) -> DomainResult<Invoice> {
        // Reject invalid input before burning a number.
        Invoice::create(template.clone())?;

        let year = template.issue_date.year();
        let (_, invoice) = self.allocator.allocate_with(year, now, |number| {
            let mut cmd = template.clone();
            cmd.number = number.clone();
            let (invoice, _) = Invoice::create(cmd).map_err(|e| StoreError::Storage(e.to_string()))?;
            self.invoices.insert(&invoice)?;
            Ok(invoice)
        })?;
        Ok(invoice)
    }

    fn ensure_period_free(&self, client_id: ClientId, period: BillingPeriod) -> DomainResult<()> {
        if self.invoices.find_active_for_period(client_id, period)?.is_some() {
            return Err(DomainError::DuplicatePeriod {
                client: client_id.to_string(),
                period: period.to_string(),
            });
        }
        Ok(())
    }

    fn load(&self, id: InvoiceId) -> DomainResult<Invoice> {
        self.invoices
            .get(id)?
            .ok_or_else(|| DomainError::not_found(format!("invoice {id}")))
    }

    /// Run one command against a stored invoice and persist the result.
    fn transition(&self, mut invoice: Invoice, command: InvoiceCommand) -> DomainResult<(Invoice, bool)> {
        let expected = ExpectedVersion::Exact(invoice.version());
        let events = invoice.execute(&command)?;
        if events.is_empty() {
            return Ok((invoice, false));
        }
        self.invoices.update(&invoice, expected)?;
        Ok((invoice, true))
    }

    /// Promote every `TRACKING` invoice whose cut date has been reached.
    pub fn activate_due(&self, now: DateTime<Utc>) -> DomainResult<BatchReport> {
        let mut report = BatchReport::default();

        for listed in self.invoices.list_by_state(InvoiceState::Tracking)? {
            if !listed.is_activatable(now) {
                continue;
            }
            let id = listed.id_typed();
            let invoice = match self.reload_if(id, |i| i.is_activatable(now)) {
                Ok(Some(invoice)) => invoice,
                Ok(None) => continue,
                Err(err) => {
                    error!(invoice_id = %id, error = %err, "invoice activation failed");
                    report.fail(id, &err);
                    continue;
                }
            };
            report.examined += 1;

            match self.transition(invoice, InvoiceCommand::Activate(ActivateInvoice { now })) {
                Ok((invoice, true)) => {
                    report.transitioned += 1;
                    info!(invoice_id = %id, "invoice activated");
                    self.notify(&invoice, |number, client_id| NotificationEvent::InvoiceActivated {
                        invoice_id: id,
                        number,
                        client_id,
                        at: now,
                    });
                }
                Ok((_, false)) => {}
                Err(err) => {
                    error!(invoice_id = %id, error = %err, "invoice activation failed");
                    report.fail(id, &err);
                }
            }
        }

        Ok(report)
    }

    /// Flag every `PENDING`/`PARTIAL` invoice that is past due with a balance.
    pub fn mark_overdue_if_past_due(&self, now: DateTime<Utc>) -> DomainResult<BatchReport> {
        let mut report = BatchReport::default();

        let mut candidates = self.invoices.list_by_state(InvoiceState::Pending)?;
        candidates.extend(self.invoices.list_by_state(InvoiceState::Partial)?);

        for listed in candidates {
            if !listed.is_past_due(now) {
                continue;
            }
            let id = listed.id_typed();
            let invoice = match self.reload_if(id, |i| i.is_past_due(now)) {
                Ok(Some(invoice)) => invoice,
                Ok(None) => continue,
                Err(err) => {
                    error!(invoice_id = %id, error = %err, "marking invoice overdue failed");
                    report.fail(id, &err);
                    continue;
                }
            };
            report.examined += 1;

            match self.transition(invoice, InvoiceCommand::MarkOverdue(MarkOverdue { now })) {
                Ok((invoice, true)) => {
                    report.transitioned += 1;
                    info!(invoice_id = %id, outstanding = %invoice.outstanding(), "invoice overdue");
                    let outstanding = invoice.outstanding();
                    self.notify(&invoice, |number, client_id| NotificationEvent::InvoiceOverdue {
                        invoice_id: id,
                        number,
                        client_id,
                        outstanding,
                        at: now,
                    });
                }
                Ok((_, false)) => {}
                Err(err) => {
                    error!(invoice_id = %id, error = %err, "marking invoice overdue failed");
                    report.fail(id, &err);
                }
            }
        }

        Ok(report)
    }

    /// Current stored copy of a listed invoice, if its guard still holds.
    /// Listings are snapshots; a payment or cancel may have landed since.
    fn reload_if(
        &self,
        id: InvoiceId,
        guard: impl Fn(&Invoice) -> bool,
    ) -> DomainResult<Option<Invoice>> {
        Ok(self.invoices.get(id)?.filter(|invoice| guard(invoice)))
    }

    /// Apply a payment and record it.
    pub fn apply_payment(
        &self,
        invoice_id: InvoiceId,
        request: PaymentRequest,
    ) -> DomainResult<(Invoice, Payment)> {
        let mut invoice = self.load(invoice_id)?;
        let payment = Payment::new(
            invoice_id,
            request.amount,
            request.paid_at,
            request.method,
            request.reference,
        );

        let expected = ExpectedVersion::Exact(invoice.version());
        invoice.execute(&InvoiceCommand::ApplyPayment(ApplyPayment {
            payment_id: payment.id,
            amount: payment.amount,
            paid_at: payment.paid_at,
        }))?;

        // The payment row goes first: an invoice balance must never drop
        // without the payment that explains it.
        self.payments.insert(&payment)?;
        if let Err(err) = self.invoices.update(&invoice, expected) {
            error!(
                invoice_id = %invoice_id,
                payment_id = %payment.id,
                error = %err,
                "payment recorded but invoice update failed"
            );
            return Err(err.into());
        }

        info!(
            invoice_id = %invoice_id,
            payment_id = %payment.id,
            amount = %payment.amount,
            outstanding = %invoice.outstanding(),
            state = ?invoice.state(),
            "payment applied"
        );

        if invoice.state() == InvoiceState::Paid {
            let at = payment.paid_at;
            self.notify(&invoice, |number, client_id| NotificationEvent::InvoicePaid {
                invoice_id,
                number,
                client_id,
                at,
            });
        }

        Ok((invoice, payment))
    }

    pub fn cancel(
        &self,
        invoice_id: InvoiceId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        let invoice = self.load(invoice_id)?;
        let (invoice, _) = self.transition(
            invoice,
            InvoiceCommand::Cancel(CancelInvoice {
                reason: reason.into(),
                occurred_at: now,
            }),
        )?;
        info!(invoice_id = %invoice_id, reason = invoice.cancellation_reason(), "invoice cancelled");
        Ok(invoice)
    }

    pub fn get(&self, invoice_id: InvoiceId) -> DomainResult<Option<Invoice>> {
        Ok(self.invoices.get(invoice_id)?)
    }

    pub fn invoices_for_client(&self, client_id: ClientId) -> DomainResult<Vec<Invoice>> {
        Ok(self.invoices.list_for_client(client_id)?)
    }

    pub fn payments_for(&self, invoice_id: InvoiceId) -> DomainResult<Vec<Payment>> {
        Ok(self.payments.list_for_invoice(invoice_id)?)
    }

    fn notify<F>(&self, invoice: &Invoice, build: F)
    where
        F: FnOnce(InvoiceNumber, ClientId) -> NotificationEvent,
    {
        if let (Some(number), Some(client_id)) = (invoice.number(), invoice.client_id()) {
            self.notifier.notify(build(number.clone(), client_id));
        }
    }
}

fn add_days(date: NaiveDate, days: u32) -> DomainResult<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| DomainError::validation(format!("{date} + {days} days is out of range")))
}
