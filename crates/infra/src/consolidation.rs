//! Month-end close.
//!
//! Closing a month freezes its statements into a `ConsolidatedPeriod` and
//! moves every currency's in-movement balance into the consolidated pool.
//! Only a complete month closes: every client with sales in it must have a
//! statement first. The close runs under the month's lock, after any statement
//! computation for that month already in flight.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use talentbill_accounting::{ConsolidatedPeriod, PeriodId};
use talentbill_core::{Currency, DomainError, DomainResult};

use crate::collaborators::{NotificationEvent, Notifier, SalesSource};
use crate::ledger_book::LedgerBook;
use crate::period_locks::PeriodLocks;
use crate::store::{PeriodStore, StatementStore};

pub struct PeriodConsolidator {
    sales: Arc<dyn SalesSource>,
    statements: Arc<dyn StatementStore>,
    periods: Arc<dyn PeriodStore>,
    ledger: Arc<LedgerBook>,
    locks: Arc<PeriodLocks>,
    notifier: Notifier,
}

impl PeriodConsolidator {
    pub fn new(
        sales: Arc<dyn SalesSource>,
        statements: Arc<dyn StatementStore>,
        periods: Arc<dyn PeriodStore>,
        ledger: Arc<LedgerBook>,
        locks: Arc<PeriodLocks>,
        notifier: Notifier,
    ) -> Self {
        Self {
            sales,
            statements,
            periods,
            ledger,
            locks,
            notifier,
        }
    }

    pub fn close_period(
        &self,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<ConsolidatedPeriod> {
        let id = PeriodId::new(year, month)?;
        self.locks.with(id, || self.close_locked(id, now))
    }

    fn close_locked(&self, id: PeriodId, now: DateTime<Utc>) -> DomainResult<ConsolidatedPeriod> {
        if self.periods.get(id)?.is_some_and(|p| p.is_closed()) {
            return Err(DomainError::PeriodAlreadyClosed(id.to_string()));
        }

        let statements = self.statements.list_for_period(id)?;
        let (from, to) = id.range()?;
        let mut missing: Vec<_> = self
            .sales
            .clients_with_sales(from, to)?
            .into_iter()
            .filter(|client| !statements.iter().any(|s| s.client_id == *client))
            .collect();
        if !missing.is_empty() {
            missing.sort();
            warn!(period = %id, missing = missing.len(), "period close blocked by missing statements");
            return Err(DomainError::PeriodIncomplete {
                period: id.to_string(),
                missing: missing.iter().map(ToString::to_string).collect(),
            });
        }

        let mut period = ConsolidatedPeriod::aggregate(id, &statements)?;

        let key = id.to_string();
        let mut transfers = Vec::with_capacity(Currency::ALL.len());
        for currency in Currency::ALL {
            let tx = match self.ledger.consolidate_into(currency, &key, now) {
                Ok(tx) => tx,
                // A crash between consolidation and save leaves the transfer
                // behind; reuse it rather than moving funds twice.
                Err(DomainError::AlreadyConsolidated(_)) => self
                    .ledger
                    .consolidation_for(currency, &key)?
                    .ok_or_else(|| {
                        DomainError::invariant(format!(
                            "consolidation for {key} in {} is missing",
                            currency.code()
                        ))
                    })?,
                Err(err) => return Err(err),
            };
            transfers.push(tx);
        }

        period.close(now, transfers)?;
        self.periods.save(&period)?;

        info!(
            period = %id,
            statements = period.statement_ids.len(),
            currencies = period.totals.len(),
            "period closed"
        );
        self.notifier.notify(NotificationEvent::PeriodClosed {
            period_id: id,
            at: now,
        });
        Ok(period)
    }

    pub fn get(&self, id: PeriodId) -> DomainResult<Option<ConsolidatedPeriod>> {
        Ok(self.periods.get(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use talentbill_accounting::{LedgerReason, MonthlyStatement, SaleRecord, StatementInput};
    use talentbill_core::{ClientId, Money, Percentage, SaleId, StatementId};

    use crate::collaborators::InMemorySalesSource;
    use crate::store::{InMemoryPeriodStore, InMemoryStatementStore};

    struct Fixture {
        consolidator: PeriodConsolidator,
        sales: Arc<InMemorySalesSource>,
        statements: Arc<InMemoryStatementStore>,
        ledger: Arc<LedgerBook>,
    }

    fn fixture() -> Fixture {
        let sales = Arc::new(InMemorySalesSource::new());
        let statements = Arc::new(InMemoryStatementStore::new());
        let ledger = Arc::new(LedgerBook::new());
        let (notifier, _bus) = Notifier::in_memory();
        let consolidator = PeriodConsolidator::new(
            sales.clone(),
            statements.clone(),
            Arc::new(InMemoryPeriodStore::new()),
            ledger.clone(),
            Arc::new(PeriodLocks::new()),
            notifier,
        );
        Fixture {
            consolidator,
            sales,
            statements,
            ledger,
        }
    }

    fn usd(units: i64) -> Money {
        Money::from_units(units, Currency::Usd).unwrap()
    }

    fn sell(f: &Fixture, client_id: ClientId) {
        f.sales
            .record(SaleRecord {
                id: SaleId::new(),
                client_id,
                amount: usd(1_000),
                kind: "tip".to_string(),
                occurred_at: Utc.with_ymd_and_hms(2025, 10, 12, 0, 0, 0).unwrap(),
            })
            .unwrap();
    }

    fn add_statement(f: &Fixture, client_id: ClientId) -> MonthlyStatement {
        let statement = MonthlyStatement::compute(StatementInput {
            id: StatementId::new(),
            client_id,
            period: PeriodId::new(2025, 10).unwrap(),
            gross_sales: usd(1_000),
            sales_count: 1,
            commission_percentage: Percentage::whole(20),
            processor_fee_percentage: Percentage::ZERO,
            computed_at: Utc::now(),
        })
        .unwrap();
        f.statements.upsert(&statement).unwrap();
        f.ledger
            .credit(
                statement.agency_net,
                LedgerReason::StatementRecognized,
                statement.id.to_string(),
                Utc::now(),
            )
            .unwrap();
        statement
    }

    #[test]
    fn closes_and_consolidates() {
        let f = fixture();
        let client = ClientId::new();
        sell(&f, client);
        add_statement(&f, client);

        let period = f.consolidator.close_period(2025, 10, Utc::now()).unwrap();
        assert!(period.is_closed());
        assert_eq!(period.totals_for(Currency::Usd).unwrap().agency_net, usd(200));
        assert_eq!(period.transfers.len(), Currency::ALL.len());

        let state = f.ledger.state(Currency::Usd).unwrap();
        assert!(state.in_movement.is_zero());
        assert_eq!(state.consolidated, usd(200));
    }

    #[test]
    fn second_close_changes_nothing() {
        let f = fixture();
        let client = ClientId::new();
        sell(&f, client);
        add_statement(&f, client);

        let first = f.consolidator.close_period(2025, 10, Utc::now()).unwrap();
        let before = f.ledger.state(Currency::Usd).unwrap();

        let err = f.consolidator.close_period(2025, 10, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::PeriodAlreadyClosed("2025-10".to_string()));
        assert_eq!(f.ledger.state(Currency::Usd).unwrap(), before);
        let stored = f
            .consolidator
            .get(PeriodId::new(2025, 10).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored, first);
    }

    #[test]
    fn missing_statements_block_close() {
        let f = fixture();
        let covered = ClientId::new();
        let uncovered = ClientId::new();
        sell(&f, covered);
        sell(&f, uncovered);
        add_statement(&f, covered);

        let err = f.consolidator.close_period(2025, 10, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::PeriodIncomplete {
                period: "2025-10".to_string(),
                missing: vec![uncovered.to_string()],
            }
        );
        assert!(f.ledger.state(Currency::Usd).unwrap().consolidated.is_zero());
    }

    #[test]
    fn reuses_transfer_left_by_interrupted_close() {
        let f = fixture();
        let client = ClientId::new();
        sell(&f, client);
        add_statement(&f, client);
        let earlier = f
            .ledger
            .consolidate_into(Currency::Usd, "2025-10", Utc::now())
            .unwrap();

        let period = f.consolidator.close_period(2025, 10, Utc::now()).unwrap();
        assert!(period.transfers.contains(&earlier));
        assert_eq!(f.ledger.state(Currency::Usd).unwrap().counters.consolidation_count, 1);
    }

    #[test]
    fn rejects_invalid_month() {
        let f = fixture();
        assert!(matches!(
            f.consolidator.close_period(2025, 13, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }
}
