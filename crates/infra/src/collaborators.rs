//! Outbound collaborator boundaries: sales ledger, contract directory, and
//! notifications.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use talentbill_accounting::{PeriodId, SaleRecord};
use talentbill_contracts::Contract;
use talentbill_core::{ClientId, DomainError, InvoiceId, Money};
use talentbill_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use talentbill_invoicing::InvoiceNumber;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl From<CollaboratorError> for DomainError {
    fn from(err: CollaboratorError) -> Self {
        DomainError::invariant(err.to_string())
    }
}

/// Read-only access to the client sales ledger.
pub trait SalesSource: Send + Sync {
    /// Sales for one client with `from <= occurred_at < to`.
    fn sales_for(
        &self,
        client_id: ClientId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SaleRecord>, CollaboratorError>;

    /// Clients with at least one sale in `[from, to)`.
    fn clients_with_sales(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClientId>, CollaboratorError>;
}

/// Read-only lookup of commission terms.
pub trait ContractDirectory: Send + Sync {
    /// The contract in force for the client, if any.
    fn current_contract(&self, client_id: ClientId) -> Result<Option<Contract>, CollaboratorError>;
}

#[derive(Debug, Default)]
pub struct InMemorySalesSource {
    sales: RwLock<Vec<SaleRecord>>,
}

impl InMemorySalesSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sale: SaleRecord) -> Result<(), CollaboratorError> {
        self.sales
            .write()
            .map_err(|_| CollaboratorError::Unavailable("sales lock poisoned".to_string()))?
            .push(sale);
        Ok(())
    }
}

impl SalesSource for InMemorySalesSource {
    fn sales_for(
        &self,
        client_id: ClientId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SaleRecord>, CollaboratorError> {
        let sales = self
            .sales
            .read()
            .map_err(|_| CollaboratorError::Unavailable("sales lock poisoned".to_string()))?;
        Ok(sales
            .iter()
            .filter(|s| s.client_id == client_id && s.occurred_at >= from && s.occurred_at < to)
            .cloned()
            .collect())
    }

    fn clients_with_sales(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClientId>, CollaboratorError> {
        let sales = self
            .sales
            .read()
            .map_err(|_| CollaboratorError::Unavailable("sales lock poisoned".to_string()))?;
        let mut clients: Vec<_> = sales
            .iter()
            .filter(|s| s.occurred_at >= from && s.occurred_at < to)
            .map(|s| s.client_id)
            .collect();
        clients.sort();
        clients.dedup();
        Ok(clients)
    }
}

/// Keeps every signed contract; the latest signature per client wins.
#[derive(Debug, Default)]
pub struct InMemoryContractDirectory {
    contracts: RwLock<HashMap<ClientId, Vec<Contract>>>,
}

impl InMemoryContractDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign(&self, contract: Contract) -> Result<(), CollaboratorError> {
        self.contracts
            .write()
            .map_err(|_| CollaboratorError::Unavailable("contracts lock poisoned".to_string()))?
            .entry(contract.client_id)
            .or_default()
            .push(contract);
        Ok(())
    }
}

impl ContractDirectory for InMemoryContractDirectory {
    fn current_contract(&self, client_id: ClientId) -> Result<Option<Contract>, CollaboratorError> {
        let contracts = self
            .contracts
            .read()
            .map_err(|_| CollaboratorError::Unavailable("contracts lock poisoned".to_string()))?;
        Ok(contracts
            .get(&client_id)
            .and_then(|all| Contract::effective(all))
            .cloned())
    }
}

/// Fire-and-forget notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    InvoiceActivated {
        invoice_id: InvoiceId,
        number: InvoiceNumber,
        client_id: ClientId,
        at: DateTime<Utc>,
    },
    InvoiceOverdue {
        invoice_id: InvoiceId,
        number: InvoiceNumber,
        client_id: ClientId,
        outstanding: Money,
        at: DateTime<Utc>,
    },
    InvoicePaid {
        invoice_id: InvoiceId,
        number: InvoiceNumber,
        client_id: ClientId,
        at: DateTime<Utc>,
    },
    PeriodClosed {
        period_id: PeriodId,
        at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Record the event is about, used as the envelope subject.
    pub fn subject(&self) -> String {
        match self {
            NotificationEvent::InvoiceActivated { invoice_id, .. }
            | NotificationEvent::InvoiceOverdue { invoice_id, .. }
            | NotificationEvent::InvoicePaid { invoice_id, .. } => invoice_id.to_string(),
            NotificationEvent::PeriodClosed { period_id, .. } => period_id.to_string(),
        }
    }
}

impl Event for NotificationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::InvoiceActivated { .. } => "billing.invoice.activated",
            NotificationEvent::InvoiceOverdue { .. } => "billing.invoice.overdue",
            NotificationEvent::InvoicePaid { .. } => "billing.invoice.paid",
            NotificationEvent::PeriodClosed { .. } => "billing.period.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            NotificationEvent::InvoiceActivated { at, .. }
            | NotificationEvent::InvoiceOverdue { at, .. }
            | NotificationEvent::InvoicePaid { at, .. }
            | NotificationEvent::PeriodClosed { at, .. } => *at,
        }
    }
}

pub type NotificationEnvelope = EventEnvelope<NotificationEvent>;

/// Bus used for notifications.
pub trait NotificationBus: Send + Sync {
    fn publish(&self, envelope: NotificationEnvelope) -> Result<(), String>;
}

impl<B> NotificationBus for B
where
    B: EventBus<NotificationEnvelope>,
{
    fn publish(&self, envelope: NotificationEnvelope) -> Result<(), String> {
        <B as EventBus<NotificationEnvelope>>::publish(self, envelope).map_err(|e| format!("{e:?}"))
    }
}

/// Publishes notifications without waiting on, or failing for, delivery.
#[derive(Clone)]
pub struct Notifier {
    bus: Arc<dyn NotificationBus>,
}

impl Notifier {
    pub fn new(bus: Arc<dyn NotificationBus>) -> Self {
        Self { bus }
    }

    /// Notifier backed by a fresh in-memory bus; the bus is returned for
    /// subscribing.
    pub fn in_memory() -> (Self, Arc<InMemoryEventBus<NotificationEnvelope>>) {
        let bus = Arc::new(InMemoryEventBus::new());
        (Self::new(bus.clone()), bus)
    }

    pub fn notify(&self, event: NotificationEvent) {
        let envelope = EventEnvelope::wrap(event.subject(), event);
        if let Err(error) = self.bus.publish(envelope) {
            warn!(%error, "failed to publish notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use talentbill_contracts::{BillingCadence, CommissionTerms};
    use talentbill_core::{Currency, Percentage, SaleId};

    #[test]
    fn latest_contract_is_current() {
        let directory = InMemoryContractDirectory::new();
        let client = ClientId::new();
        let sign = |pct: i64, month: u32| {
            Contract::new(
                client,
                CommissionTerms::Flat {
                    percentage: Percentage::whole(pct),
                },
                BillingCadence::Monthly,
                Money::zero(Currency::Usd),
                5,
                Utc.with_ymd_and_hms(2025, month, 1, 0, 0, 0).unwrap(),
            )
            .unwrap()
        };
        directory.sign(sign(20, 6)).unwrap();
        directory.sign(sign(10, 1)).unwrap();

        let current = directory.current_contract(client).unwrap().unwrap();
        assert_eq!(
            current.terms,
            CommissionTerms::Flat {
                percentage: Percentage::whole(20)
            }
        );
        assert!(directory.current_contract(ClientId::new()).unwrap().is_none());
    }

    #[test]
    fn clients_with_sales_are_deduplicated() {
        let source = InMemorySalesSource::new();
        let client = ClientId::new();
        let at = Utc.with_ymd_and_hms(2025, 10, 5, 0, 0, 0).unwrap();
        for _ in 0..3 {
            source
                .record(SaleRecord {
                    id: SaleId::new(),
                    client_id: client,
                    amount: Money::from_units(1, Currency::Usd).unwrap(),
                    kind: "tip".to_string(),
                    occurred_at: at,
                })
                .unwrap();
        }

        let (from, to) = PeriodId::new(2025, 10).unwrap().range().unwrap();
        assert_eq!(source.clients_with_sales(from, to).unwrap(), vec![client]);
        assert_eq!(source.sales_for(client, from, to).unwrap().len(), 3);
    }

    #[test]
    fn notifier_wraps_events_in_envelopes() {
        let (notifier, bus) = Notifier::in_memory();
        let sub = bus.subscribe();

        let period_id = PeriodId::new(2025, 10).unwrap();
        notifier.notify(NotificationEvent::PeriodClosed {
            period_id,
            at: Utc::now(),
        });

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event_type(), "billing.period.closed");
        assert_eq!(envelope.subject(), "2025-10");
    }
}
