//! In-memory stores for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use talentbill_accounting::{ConsolidatedPeriod, MonthlyStatement, PeriodId};
use talentbill_core::{AggregateRoot, ClientId, ExpectedVersion, InvoiceId};
use talentbill_invoicing::{BillingPeriod, Invoice, InvoiceNumber, InvoiceState, Payment};

use super::r#trait::{
    InvoiceNumberIndex, InvoiceStore, PaymentStore, PeriodStore, StatementStore, StoreError,
};

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

/// In-memory invoices table with the number and period unique constraints.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn check_unique(
        existing: &HashMap<InvoiceId, Invoice>,
        candidate: &Invoice,
    ) -> Result<(), StoreError> {
        for other in existing.values() {
            if other.id_typed() == candidate.id_typed() {
                continue;
            }
            if other.number().is_some() && other.number() == candidate.number() {
                return Err(StoreError::DuplicateNumber(
                    candidate.number().map(|n| n.to_string()).unwrap_or_default(),
                ));
            }
            let same_period = candidate.period().is_some()
                && other.period() == candidate.period()
                && other.client_id() == candidate.client_id();
            if same_period && other.state().is_active() && candidate.state().is_active() {
                return Err(StoreError::DuplicatePeriod {
                    client: candidate.client_id().map(|c| c.to_string()).unwrap_or_default(),
                    period: candidate.period().map(|p| p.to_string()).unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

impl InvoiceNumberIndex for InMemoryInvoiceStore {
    fn highest_sequence(&self, prefix: &str, year: i32) -> Result<Option<u32>, StoreError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        Ok(invoices
            .values()
            .filter_map(|inv| inv.number())
            .filter_map(|n| n.sequence_for(prefix, year))
            .max())
    }

    fn number_exists(&self, number: &InvoiceNumber) -> Result<bool, StoreError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        Ok(invoices.values().any(|inv| inv.number() == Some(number)))
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn insert(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write().map_err(|_| poisoned())?;
        if invoices.contains_key(&invoice.id_typed()) {
            return Err(StoreError::AlreadyExists(format!("invoice {}", invoice.id_typed())));
        }
        Self::check_unique(&invoices, invoice)?;
        invoices.insert(invoice.id_typed(), invoice.clone());
        Ok(())
    }

    fn update(&self, invoice: &Invoice, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write().map_err(|_| poisoned())?;
        let stored = invoices
            .get(&invoice.id_typed())
            .ok_or_else(|| StoreError::NotFound(format!("invoice {}", invoice.id_typed())))?;
        if !expected.matches(stored.version()) {
            return Err(StoreError::Concurrency {
                expected,
                actual: stored.version(),
            });
        }
        Self::check_unique(&invoices, invoice)?;
        invoices.insert(invoice.id_typed(), invoice.clone());
        Ok(())
    }

    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        Ok(invoices.get(&id).cloned())
    }

    fn find_active_for_period(
        &self,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<Option<Invoice>, StoreError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        Ok(invoices
            .values()
            .find(|inv| {
                inv.client_id() == Some(client_id)
                    && inv.period() == Some(period)
                    && inv.state().is_active()
            })
            .cloned())
    }

    fn list_by_state(&self, state: InvoiceState) -> Result<Vec<Invoice>, StoreError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        let mut out: Vec<_> = invoices
            .values()
            .filter(|inv| inv.state() == state)
            .cloned()
            .collect();
        out.sort_by_key(|inv| inv.id_typed());
        Ok(out)
    }

    fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, StoreError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        let mut out: Vec<_> = invoices
            .values()
            .filter(|inv| inv.client_id() == Some(client_id))
            .cloned()
            .collect();
        out.sort_by_key(|inv| inv.id_typed());
        Ok(out)
    }
}

/// In-memory payments table.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<Vec<Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentStore for InMemoryPaymentStore {
    fn insert(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().map_err(|_| poisoned())?;
        if payments.iter().any(|p| p.id == payment.id) {
            return Err(StoreError::AlreadyExists(format!("payment {}", payment.id)));
        }
        payments.push(payment.clone());
        Ok(())
    }

    fn list_for_invoice(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>, StoreError> {
        let payments = self.payments.read().map_err(|_| poisoned())?;
        Ok(payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}

/// In-memory monthly statements keyed by `(client, period)`.
#[derive(Debug, Default)]
pub struct InMemoryStatementStore {
    statements: RwLock<HashMap<(ClientId, PeriodId), MonthlyStatement>>,
}

impl InMemoryStatementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatementStore for InMemoryStatementStore {
    fn upsert(&self, statement: &MonthlyStatement) -> Result<(), StoreError> {
        let mut statements = self.statements.write().map_err(|_| poisoned())?;
        statements.insert((statement.client_id, statement.period), statement.clone());
        Ok(())
    }

    fn get(
        &self,
        client_id: ClientId,
        period: PeriodId,
    ) -> Result<Option<MonthlyStatement>, StoreError> {
        let statements = self.statements.read().map_err(|_| poisoned())?;
        Ok(statements.get(&(client_id, period)).cloned())
    }

    fn list_for_period(&self, period: PeriodId) -> Result<Vec<MonthlyStatement>, StoreError> {
        let statements = self.statements.read().map_err(|_| poisoned())?;
        let mut out: Vec<_> = statements
            .values()
            .filter(|s| s.period == period)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }
}

/// In-memory consolidated periods.
#[derive(Debug, Default)]
pub struct InMemoryPeriodStore {
    periods: RwLock<HashMap<PeriodId, ConsolidatedPeriod>>,
}

impl InMemoryPeriodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeriodStore for InMemoryPeriodStore {
    fn get(&self, id: PeriodId) -> Result<Option<ConsolidatedPeriod>, StoreError> {
        let periods = self.periods.read().map_err(|_| poisoned())?;
        Ok(periods.get(&id).cloned())
    }

    fn save(&self, period: &ConsolidatedPeriod) -> Result<(), StoreError> {
        let mut periods = self.periods.write().map_err(|_| poisoned())?;
        if periods.get(&period.id).is_some_and(|p| p.is_closed()) {
            return Err(StoreError::AlreadyExists(format!("closed period {}", period.id)));
        }
        periods.insert(period.id, period.clone());
        Ok(())
    }
}
