//! Monthly statement computation.
//!
//! Pulls the client's sales for the month, resolves the commission percentage
//! from their current contract, splits gross sales, and posts the agency net
//! to the ledger's in-movement pool. Recomputing an open month replaces the
//! stored statement and reverses the previous posting first. The month's lock
//! is held throughout, so a close never sees a half-posted statement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use talentbill_accounting::{LedgerReason, MonthlyStatement, PeriodId, StatementInput, gross_sales};
use talentbill_contracts::CommissionCalculator;
use talentbill_core::{ClientId, DomainError, DomainResult, Money, Percentage, StatementId};

use crate::collaborators::{ContractDirectory, SalesSource};
use crate::ledger_book::LedgerBook;
use crate::period_locks::PeriodLocks;
use crate::store::{PeriodStore, StatementStore};

pub struct FinancialStatementEngine {
    sales: Arc<dyn SalesSource>,
    contracts: Arc<dyn ContractDirectory>,
    statements: Arc<dyn StatementStore>,
    periods: Arc<dyn PeriodStore>,
    ledger: Arc<LedgerBook>,
    locks: Arc<PeriodLocks>,
    calculator: CommissionCalculator,
    processor_fee: Percentage,
}

impl FinancialStatementEngine {
    pub fn new(
        sales: Arc<dyn SalesSource>,
        contracts: Arc<dyn ContractDirectory>,
        statements: Arc<dyn StatementStore>,
        periods: Arc<dyn PeriodStore>,
        ledger: Arc<LedgerBook>,
        locks: Arc<PeriodLocks>,
        processor_fee: Percentage,
    ) -> Self {
        Self {
            sales,
            contracts,
            statements,
            periods,
            ledger,
            locks,
            calculator: CommissionCalculator::new(),
            processor_fee,
        }
    }

    /// Compute (or recompute) the statement for `client_id` in `period`.
    pub fn compute(
        &self,
        client_id: ClientId,
        period: PeriodId,
        now: DateTime<Utc>,
    ) -> DomainResult<MonthlyStatement> {
        self.locks
            .with(period, || self.compute_locked(client_id, period, now))
    }

    fn compute_locked(
        &self,
        client_id: ClientId,
        period: PeriodId,
        now: DateTime<Utc>,
    ) -> DomainResult<MonthlyStatement> {
        if let Some(consolidated) = self.periods.get(period)? {
            if consolidated.is_closed() {
                return Err(DomainError::PeriodClosed(period.to_string()));
            }
        }

        let contract = self
            .contracts
            .current_contract(client_id)?
            .ok_or_else(|| DomainError::not_found(format!("contract for client {client_id}")))?;

        let (from, to) = period.range()?;
        let sales = self.sales.sales_for(client_id, from, to)?;
        let (gross, sales_count) = gross_sales(contract.currency(), period, &sales)?;
        let commission_percentage = self.calculator.effective_percentage(&gross, &contract)?;

        let prior = self.statements.get(client_id, period)?;
        let statement = MonthlyStatement::compute(StatementInput {
            id: prior.as_ref().map_or_else(StatementId::new, |s| s.id),
            client_id,
            period,
            gross_sales: gross,
            sales_count,
            commission_percentage,
            processor_fee_percentage: self.processor_fee,
            computed_at: now,
        })?;

        if let Some(prior) = &prior {
            let reversal = Money::zero(prior.currency()).subtract(&prior.agency_net)?;
            self.ledger.post_signed(
                reversal,
                LedgerReason::StatementReversed,
                prior.id.to_string(),
                now,
            )?;
        }
        self.ledger.post_signed(
            statement.agency_net,
            LedgerReason::StatementRecognized,
            statement.id.to_string(),
            now,
        )?;
        self.statements.upsert(&statement)?;

        info!(
            statement_id = %statement.id,
            client_id = %client_id,
            period = %period,
            gross_sales = %statement.gross_sales,
            agency_net = %statement.agency_net,
            commission = %commission_percentage,
            recomputed = prior.is_some(),
            "monthly statement computed"
        );
        Ok(statement)
    }

    pub fn get(&self, client_id: ClientId, period: PeriodId) -> DomainResult<Option<MonthlyStatement>> {
        Ok(self.statements.get(client_id, period)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use chrono::TimeZone;
    use talentbill_accounting::{ConsolidatedPeriod, SaleRecord};
    use talentbill_contracts::{BillingCadence, CommissionTerms, Contract};
    use talentbill_core::{Currency, SaleId};

    use crate::collaborators::{
        CollaboratorError, InMemoryContractDirectory, InMemorySalesSource, Notifier,
    };
    use crate::consolidation::PeriodConsolidator;
    use crate::store::{InMemoryPeriodStore, InMemoryStatementStore};

    fn usd(units: i64) -> Money {
        Money::from_units(units, Currency::Usd).unwrap()
    }

    struct Fixture {
        engine: FinancialStatementEngine,
        sales: Arc<InMemorySalesSource>,
        contracts: Arc<InMemoryContractDirectory>,
        statements: Arc<InMemoryStatementStore>,
        periods: Arc<InMemoryPeriodStore>,
        ledger: Arc<LedgerBook>,
        client: ClientId,
    }

    fn fixture() -> Fixture {
        let sales = Arc::new(InMemorySalesSource::new());
        let contracts = Arc::new(InMemoryContractDirectory::new());
        let statements = Arc::new(InMemoryStatementStore::new());
        let periods = Arc::new(InMemoryPeriodStore::new());
        let ledger = Arc::new(LedgerBook::new());
        let client = ClientId::new();
        contracts
            .sign(
                Contract::new(
                    client,
                    CommissionTerms::Flat {
                        percentage: Percentage::whole(30),
                    },
                    BillingCadence::Monthly,
                    usd(0),
                    5,
                    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                )
                .unwrap(),
            )
            .unwrap();

        let engine = FinancialStatementEngine::new(
            sales.clone(),
            contracts.clone(),
            statements.clone(),
            periods.clone(),
            ledger.clone(),
            Arc::new(PeriodLocks::new()),
            Percentage::whole(10),
        );
        Fixture {
            engine,
            sales,
            contracts,
            statements,
            periods,
            ledger,
            client,
        }
    }

    fn record(f: &Fixture, units: i64, day: u32) {
        f.sales
            .record(SaleRecord {
                id: SaleId::new(),
                client_id: f.client,
                amount: usd(units),
                kind: "subscription".to_string(),
                occurred_at: Utc.with_ymd_and_hms(2025, 10, day, 12, 0, 0).unwrap(),
            })
            .unwrap();
    }

    fn october() -> PeriodId {
        PeriodId::new(2025, 10).unwrap()
    }

    #[test]
    fn splits_sales_and_credits_agency_net() {
        let f = fixture();
        record(&f, 600, 3);
        record(&f, 400, 20);

        let statement = f.engine.compute(f.client, october(), Utc::now()).unwrap();
        assert_eq!(statement.gross_sales, usd(1_000));
        assert_eq!(statement.agency_commission, usd(300));
        assert_eq!(statement.processor_commission, usd(30));
        assert_eq!(statement.client_payout, usd(700));
        assert_eq!(statement.agency_net, usd(270));
        assert_eq!(statement.sales_count, 2);

        assert_eq!(f.ledger.state(Currency::Usd).unwrap().in_movement, usd(270));
    }

    #[test]
    fn recompute_reverses_previous_posting() {
        let f = fixture();
        record(&f, 1_000, 3);
        let first = f.engine.compute(f.client, october(), Utc::now()).unwrap();

        record(&f, 1_000, 4);
        let second = f.engine.compute(f.client, october(), Utc::now()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.agency_net, usd(540));

        let state = f.ledger.state(Currency::Usd).unwrap();
        assert_eq!(state.in_movement, usd(540));
        assert_eq!(state.counters.credit_count, 2);
        assert_eq!(state.counters.debit_count, 1);
        f.ledger.verify().unwrap();
    }

    #[test]
    fn month_without_sales_yields_zero_statement() {
        let f = fixture();
        let statement = f.engine.compute(f.client, october(), Utc::now()).unwrap();
        assert!(statement.gross_sales.is_zero());
        assert_eq!(statement.sales_count, 0);
    }

    #[test]
    fn client_without_contract_is_not_found() {
        let f = fixture();
        let err = f.engine.compute(ClientId::new(), october(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn closed_period_cannot_be_recomputed() {
        let f = fixture();
        let mut period = ConsolidatedPeriod::open(october());
        period.close(Utc::now(), Vec::new()).unwrap();
        f.periods.save(&period).unwrap();

        let err = f.engine.compute(f.client, october(), Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::PeriodClosed("2025-10".to_string()));
        assert_eq!(f.ledger.state(Currency::Usd).unwrap().counters.transaction_count, 0);
    }

    /// Sales source that starts a month close from another thread the first
    /// time it is read, then gives the close a moment to run.
    struct CloseDuringRead {
        inner: Arc<InMemorySalesSource>,
        consolidator: Arc<PeriodConsolidator>,
        armed: AtomicBool,
        close: Mutex<Option<thread::JoinHandle<DomainResult<ConsolidatedPeriod>>>>,
    }

    impl SalesSource for CloseDuringRead {
        fn sales_for(
            &self,
            client_id: ClientId,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<SaleRecord>, CollaboratorError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                let consolidator = self.consolidator.clone();
                let (done_tx, done_rx) = mpsc::channel();
                let handle = thread::spawn(move || {
                    let result = consolidator.close_period(2025, 10, Utc::now());
                    let _ = done_tx.send(());
                    result
                });
                let _ = done_rx.recv_timeout(Duration::from_millis(200));
                *self.close.lock().unwrap() = Some(handle);
            }
            self.inner.sales_for(client_id, from, to)
        }

        fn clients_with_sales(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<ClientId>, CollaboratorError> {
            self.inner.clients_with_sales(from, to)
        }
    }

    #[test]
    fn close_waits_for_recompute_in_flight() {
        let f = fixture();
        record(&f, 1_000, 3);
        f.engine.compute(f.client, october(), Utc::now()).unwrap();
        record(&f, 1_000, 4);

        let (notifier, _bus) = Notifier::in_memory();
        let locks = Arc::new(PeriodLocks::new());
        let consolidator = Arc::new(PeriodConsolidator::new(
            f.sales.clone(),
            f.statements.clone(),
            f.periods.clone(),
            f.ledger.clone(),
            locks.clone(),
            notifier,
        ));
        let sales = Arc::new(CloseDuringRead {
            inner: f.sales.clone(),
            consolidator,
            armed: AtomicBool::new(true),
            close: Mutex::new(None),
        });
        let engine = FinancialStatementEngine::new(
            sales.clone(),
            f.contracts.clone(),
            f.statements.clone(),
            f.periods.clone(),
            f.ledger.clone(),
            locks,
            Percentage::whole(10),
        );

        let recomputed = engine.compute(f.client, october(), Utc::now()).unwrap();
        assert_eq!(recomputed.agency_net, usd(540));

        let handle = sales.close.lock().unwrap().take().unwrap();
        let period = handle.join().unwrap().unwrap();
        assert_eq!(period.totals_for(Currency::Usd).unwrap().agency_net, usd(540));

        let state = f.ledger.state(Currency::Usd).unwrap();
        assert!(state.in_movement.is_zero());
        assert_eq!(state.consolidated, usd(540));
        f.ledger.verify().unwrap();
    }
}
