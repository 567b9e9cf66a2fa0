use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use talentbill_core::{
    Aggregate, AggregateRoot, ClientId, ContractId, Currency, DomainError, InvoiceId, Money,
    PaymentId,
};
use talentbill_events::Event;

use crate::number::InvoiceNumber;
use crate::period::BillingPeriod;

/// Invoice state lifecycle.
///
/// ```text
/// TRACKING --(cut date)--> PENDING --(pay part)--> PARTIAL --(pay rest)--> PAID
///                             |                       |
///                             +--(due date)--> OVERDUE <+   (payments still apply)
/// any non-PAID state --(cancel)--> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    Tracking,
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceState::Paid | InvoiceState::Cancelled)
    }

    /// States that count toward the one-invoice-per-period rule.
    pub fn is_active(&self) -> bool {
        *self != InvoiceState::Cancelled
    }
}

/// Caller-supplied line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub concept: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Line item with its computed subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub concept: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    number: Option<InvoiceNumber>,
    client_id: Option<ClientId>,
    contract_id: Option<ContractId>,
    period: Option<BillingPeriod>,
    lines: Vec<LineItem>,
    discount: Money,
    total: Money,
    outstanding: Money,
    issue_date: Option<NaiveDate>,
    cut_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    state: InvoiceState,
    payment_ids: Vec<PaymentId>,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            number: None,
            client_id: None,
            contract_id: None,
            period: None,
            lines: Vec::new(),
            discount: Money::zero(Currency::Usd),
            total: Money::zero(Currency::Usd),
            outstanding: Money::zero(Currency::Usd),
            issue_date: None,
            cut_date: None,
            due_date: None,
            state: InvoiceState::Pending,
            payment_ids: Vec::new(),
            notes: None,
            cancellation_reason: None,
            version: 0,
            created: false,
        }
    }

    /// Build an invoice from a creation command in one step.
    pub fn create(cmd: CreateInvoice) -> Result<(Self, InvoiceEvent), DomainError> {
        let mut invoice = Self::empty(cmd.invoice_id);
        let mut events = invoice.execute(&InvoiceCommand::Create(cmd))?;
        let event = events
            .pop()
            .ok_or_else(|| DomainError::invariant("invoice creation produced no event"))?;
        Ok((invoice, event))
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn number(&self) -> Option<&InvoiceNumber> {
        self.number.as_ref()
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn contract_id(&self) -> Option<ContractId> {
        self.contract_id
    }

    pub fn period(&self) -> Option<BillingPeriod> {
        self.period
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn outstanding(&self) -> Money {
        self.outstanding
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn cut_date(&self) -> Option<NaiveDate> {
        self.cut_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn state(&self) -> InvoiceState {
        self.state
    }

    pub fn payment_ids(&self) -> &[PaymentId] {
        &self.payment_ids
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// `TRACKING` and the cut date has been reached.
    pub fn is_activatable(&self, now: DateTime<Utc>) -> bool {
        self.created
            && self.state == InvoiceState::Tracking
            && self.cut_date.is_some_and(|cut| cut <= now.date_naive())
    }

    /// `PENDING`/`PARTIAL`, past due, with a balance left.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.created
            && matches!(self.state, InvoiceState::Pending | InvoiceState::Partial)
            && self.outstanding.is_positive()
            && self.due_date.is_some_and(|due| due < now.date_naive())
    }

    /// Invariant: payments only land on billable invoices with a balance.
    pub fn can_accept_payment(&self) -> bool {
        matches!(
            self.state,
            InvoiceState::Pending | InvoiceState::Partial | InvoiceState::Overdue
        ) && self.outstanding.is_positive()
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: create an invoice, either scheduled (starts `TRACKING`) or manual
/// (starts `PENDING`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub invoice_id: InvoiceId,
    pub number: InvoiceNumber,
    pub client_id: ClientId,
    pub contract_id: Option<ContractId>,
    pub period: Option<BillingPeriod>,
    pub lines: Vec<LineItemInput>,
    pub discount: Money,
    pub issue_date: NaiveDate,
    pub cut_date: NaiveDate,
    pub due_date: NaiveDate,
    pub scheduled: bool,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: promote a `TRACKING` invoice once its cut date is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateInvoice {
    pub now: DateTime<Utc>,
}

/// Command: apply a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

/// Command: flag a past-due invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub now: DateTime<Utc>,
}

/// Command: cancel an invoice (manual, terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Create(CreateInvoice),
    Activate(ActivateInvoice),
    ApplyPayment(ApplyPayment),
    MarkOverdue(MarkOverdue),
    Cancel(CancelInvoice),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub invoice_id: InvoiceId,
    pub number: InvoiceNumber,
    pub client_id: ClientId,
    pub contract_id: Option<ContractId>,
    pub period: Option<BillingPeriod>,
    pub lines: Vec<LineItem>,
    pub discount: Money,
    pub total: Money,
    pub issue_date: NaiveDate,
    pub cut_date: NaiveDate,
    pub due_date: NaiveDate,
    pub state: InvoiceState,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceActivated {
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub new_outstanding: Money,
    pub state: InvoiceState,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMarkedOverdue {
    pub invoice_id: InvoiceId,
    pub outstanding: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceActivated(InvoiceActivated),
    PaymentApplied(PaymentApplied),
    InvoiceMarkedOverdue(InvoiceMarkedOverdue),
    InvoiceCancelled(InvoiceCancelled),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::InvoiceActivated(_) => "invoicing.invoice.activated",
            InvoiceEvent::PaymentApplied(_) => "invoicing.invoice.payment_applied",
            InvoiceEvent::InvoiceMarkedOverdue(_) => "invoicing.invoice.overdue",
            InvoiceEvent::InvoiceCancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoiceActivated(e) => e.occurred_at,
            InvoiceEvent::PaymentApplied(e) => e.occurred_at,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.number = Some(e.number.clone());
                self.client_id = Some(e.client_id);
                self.contract_id = e.contract_id;
                self.period = e.period;
                self.lines = e.lines.clone();
                self.discount = e.discount;
                self.total = e.total;
                self.outstanding = e.total;
                self.issue_date = Some(e.issue_date);
                self.cut_date = Some(e.cut_date);
                self.due_date = Some(e.due_date);
                self.state = e.state;
                self.notes = e.notes.clone();
                self.created = true;
            }
            InvoiceEvent::InvoiceActivated(_) => {
                self.state = InvoiceState::Pending;
            }
            InvoiceEvent::PaymentApplied(e) => {
                self.outstanding = e.new_outstanding;
                self.payment_ids.push(e.payment_id);
                self.state = e.state;
            }
            InvoiceEvent::InvoiceMarkedOverdue(_) => {
                self.state = InvoiceState::Overdue;
            }
            InvoiceEvent::InvoiceCancelled(e) => {
                self.state = InvoiceState::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Create(cmd) => self.handle_create(cmd),
            InvoiceCommand::Activate(cmd) => self.handle_activate(cmd),
            InvoiceCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
            InvoiceCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
            InvoiceCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Invoice {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("invoice {}", self.id)));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }
        if cmd.due_date < cmd.cut_date {
            return Err(DomainError::validation("due date precedes cut date"));
        }
        if cmd.discount.is_negative() {
            return Err(DomainError::validation("discount cannot be negative"));
        }

        let currency = cmd.discount.currency();
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for input in &cmd.lines {
            if input.quantity == 0 {
                return Err(DomainError::validation("invoice line quantity must be positive"));
            }
            if input.unit_price.is_negative() {
                return Err(DomainError::validation(
                    "invoice line unit_price cannot be negative",
                ));
            }
            input.unit_price.ensure_same_currency(&cmd.discount)?;
            let subtotal = input.unit_price.multiply(i64::from(input.quantity))?;
            lines.push(LineItem {
                concept: input.concept.clone(),
                quantity: input.quantity,
                unit_price: input.unit_price,
                subtotal,
            });
        }

        let gross = Money::sum(currency, lines.iter().map(|l| &l.subtotal))?;
        let total = gross.subtract(&cmd.discount)?;
        if total.is_negative() {
            return Err(DomainError::validation(format!(
                "discount {} exceeds line total {}",
                cmd.discount, gross
            )));
        }
        // Nothing could ever be paid against it, so it would never settle.
        if total.is_zero() {
            return Err(DomainError::validation("invoice total must be positive"));
        }

        let state = if cmd.scheduled {
            InvoiceState::Tracking
        } else {
            InvoiceState::Pending
        };

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            invoice_id: cmd.invoice_id,
            number: cmd.number.clone(),
            client_id: cmd.client_id,
            contract_id: cmd.contract_id,
            period: cmd.period,
            lines,
            discount: cmd.discount,
            total,
            issue_date: cmd.issue_date,
            cut_date: cmd.cut_date,
            due_date: cmd.due_date,
            state,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        if self.state != InvoiceState::Tracking {
            return Err(DomainError::invalid_transition(self.state, "activate"));
        }
        if !self.is_activatable(cmd.now) {
            return Err(DomainError::validation(format!(
                "cut date {:?} not reached",
                self.cut_date
            )));
        }
        Ok(vec![InvoiceEvent::InvoiceActivated(InvoiceActivated {
            invoice_id: self.id,
            occurred_at: cmd.now,
        })])
    }

    fn handle_apply_payment(&self, cmd: &ApplyPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;

        if self.state.is_terminal() {
            return Err(DomainError::InvoiceAlreadyClosed(self.display_ref()));
        }
        if self.state == InvoiceState::Tracking {
            return Err(DomainError::invalid_transition(self.state, "apply payment"));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        cmd.amount.ensure_same_currency(&self.outstanding)?;
        if cmd.amount.scaled() > self.outstanding.scaled() {
            return Err(DomainError::OverpaymentRejected {
                attempted: exact(&cmd.amount),
                outstanding: exact(&self.outstanding),
            });
        }

        let new_outstanding = self.outstanding.subtract(&cmd.amount)?;
        let state = if new_outstanding.is_zero() {
            InvoiceState::Paid
        } else {
            InvoiceState::Partial
        };

        Ok(vec![InvoiceEvent::PaymentApplied(PaymentApplied {
            invoice_id: self.id,
            payment_id: cmd.payment_id,
            amount: cmd.amount,
            new_outstanding,
            state,
            occurred_at: cmd.paid_at,
        })])
    }

    fn handle_mark_overdue(&self, cmd: &MarkOverdue) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        match self.state {
            // Re-running the overdue sweep is a no-op.
            InvoiceState::Overdue => Ok(vec![]),
            InvoiceState::Pending | InvoiceState::Partial => {
                if !self.is_past_due(cmd.now) {
                    return Ok(vec![]);
                }
                Ok(vec![InvoiceEvent::InvoiceMarkedOverdue(InvoiceMarkedOverdue {
                    invoice_id: self.id,
                    outstanding: self.outstanding,
                    occurred_at: cmd.now,
                })])
            }
            other => Err(DomainError::invalid_transition(other, "mark overdue")),
        }
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        if self.state.is_terminal() {
            return Err(DomainError::invalid_transition(self.state, "cancel"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason is required"));
        }
        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            invoice_id: self.id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn display_ref(&self) -> String {
        self.number
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Unrounded amount for error text; display rounding can hide sub-cent gaps.
fn exact(amount: &Money) -> String {
    format!("{} {}", amount.currency().code(), amount.as_decimal().normalize())
}
