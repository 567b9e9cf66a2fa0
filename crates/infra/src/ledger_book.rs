//! Shared, thread-safe owner of the per-currency ledger logs.
//!
//! Each currency has its own log behind its own mutex. Credits and debits hold
//! it just long enough to append; `consolidate_into` holds it for the single
//! read-then-transfer so no credit can slip between the read of the
//! in-movement balance and the transfer. Currencies never block each other.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::info;

use talentbill_accounting::{LedgerLog, LedgerReason, LedgerState, LedgerTransaction};
use talentbill_core::{Currency, DomainError, DomainResult, Money};

pub struct LedgerBook {
    logs: BTreeMap<Currency, Mutex<LedgerLog>>,
}

impl Default for LedgerBook {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerBook {
    pub fn new() -> Self {
        Self {
            logs: Currency::ALL
                .into_iter()
                .map(|c| (c, Mutex::new(LedgerLog::new(c))))
                .collect(),
        }
    }

    fn log(&self, currency: Currency) -> DomainResult<MutexGuard<'_, LedgerLog>> {
        self.logs
            .get(&currency)
            .ok_or_else(|| DomainError::invariant(format!("no ledger for {}", currency.code())))?
            .lock()
            .map_err(|_| DomainError::invariant("ledger lock poisoned"))
    }

    pub fn credit(
        &self,
        amount: Money,
        reason: LedgerReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        self.log(amount.currency())?.credit(amount, reason, reference, at)
    }

    pub fn debit(
        &self,
        amount: Money,
        reason: LedgerReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        self.log(amount.currency())?.debit(amount, reason, reference, at)
    }

    /// Post a signed amount: a credit when non-negative, otherwise a debit of
    /// its magnitude.
    pub fn post_signed(
        &self,
        amount: Money,
        reason: LedgerReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        if amount.is_negative() {
            let magnitude = Money::zero(amount.currency()).subtract(&amount)?;
            self.debit(magnitude, reason, reference, at)
        } else {
            self.credit(amount, reason, reference, at)
        }
    }

    pub fn consolidate_into(
        &self,
        currency: Currency,
        period_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        let mut log = self.log(currency)?;
        let tx = log.consolidate_into(period_id, at)?;
        info!(
            currency = currency.code(),
            period = period_id,
            amount = %tx.amount,
            sequence = tx.sequence,
            "ledger consolidated"
        );
        Ok(tx)
    }

    pub fn consolidation_for(
        &self,
        currency: Currency,
        period_id: &str,
    ) -> DomainResult<Option<LedgerTransaction>> {
        Ok(self.log(currency)?.consolidation_for(period_id).cloned())
    }

    pub fn state(&self, currency: Currency) -> DomainResult<LedgerState> {
        Ok(self.log(currency)?.state().clone())
    }

    pub fn transactions(&self, currency: Currency) -> DomainResult<Vec<LedgerTransaction>> {
        Ok(self.log(currency)?.transactions().to_vec())
    }

    /// Replay every log and compare against the live balances.
    pub fn verify(&self) -> DomainResult<()> {
        for currency in self.logs.keys() {
            self.log(*currency)?.verify()?;
        }
        Ok(())
    }
}
