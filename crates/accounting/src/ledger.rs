//! Two-pool revenue ledger.
//!
//! Every movement is a [`LedgerTransaction`] appended to a per-currency log.
//! Pool balances are never stored as the primary fact: [`LedgerState`] is the
//! running fold of the log and [`LedgerLog::replay`] rebuilds it from zero.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use talentbill_core::{Currency, DomainError, DomainResult, Money};

/// Transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Adds to the in-movement pool.
    Credit,
    /// Subtracts from the in-movement pool.
    Debit,
    /// Moves the whole in-movement balance into the consolidated pool.
    Consolidation,
}

/// Fund pool a transaction lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pool {
    InMovement,
    Consolidated,
}

/// Why a transaction was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Agency net recognized by a statement computation.
    StatementRecognized,
    /// Reversal of a superseded statement's agency net.
    StatementReversed,
    /// Month close.
    PeriodConsolidated,
    /// Manual correction.
    Adjustment,
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub sequence: u64,
    pub kind: TransactionKind,
    pub pool: Pool,
    pub amount: Money,
    pub reason: LedgerReason,
    /// Statement id for credits/debits, period id for consolidations.
    pub reference: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounters {
    pub transaction_count: u64,
    pub credit_count: u64,
    pub debit_count: u64,
    pub consolidation_count: u64,
    pub last_sequence: u64,
}

/// Derived pool balances for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub currency: Currency,
    pub in_movement: Money,
    pub consolidated: Money,
    pub counters: LedgerCounters,
}

impl LedgerState {
    pub fn empty(currency: Currency) -> Self {
        Self {
            currency,
            in_movement: Money::zero(currency),
            consolidated: Money::zero(currency),
            counters: LedgerCounters::default(),
        }
    }

    /// Fold one transaction into the balances.
    pub fn apply(&mut self, tx: &LedgerTransaction) -> DomainResult<()> {
        if tx.sequence != self.counters.last_sequence + 1 {
            return Err(DomainError::invariant(format!(
                "ledger sequence gap: expected {}, got {}",
                self.counters.last_sequence + 1,
                tx.sequence
            )));
        }

        match tx.kind {
            TransactionKind::Credit => {
                self.in_movement = self.in_movement.add(&tx.amount)?;
                self.counters.credit_count += 1;
            }
            TransactionKind::Debit => {
                self.in_movement = self.in_movement.subtract(&tx.amount)?;
                self.counters.debit_count += 1;
            }
            TransactionKind::Consolidation => {
                self.in_movement = self.in_movement.subtract(&tx.amount)?;
                self.consolidated = self.consolidated.add(&tx.amount)?;
                self.counters.consolidation_count += 1;
            }
        }

        self.counters.transaction_count += 1;
        self.counters.last_sequence = tx.sequence;
        Ok(())
    }
}

/// Append-only transaction log for a single currency.
///
/// `credit`/`debit` only ever append; `consolidate_into` reads the current
/// in-movement balance and appends a transfer of exactly that amount. Callers
/// sharing a log across threads must serialize `consolidate_into`.
#[derive(Debug, Clone)]
pub struct LedgerLog {
    currency: Currency,
    transactions: Vec<LedgerTransaction>,
    state: LedgerState,
    consolidations: HashMap<String, usize>,
}

impl LedgerLog {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            transactions: Vec::new(),
            state: LedgerState::empty(currency),
            consolidations: HashMap::new(),
        }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.transactions
    }

    pub fn credit(
        &mut self,
        amount: Money,
        reason: LedgerReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        self.append(TransactionKind::Credit, Pool::InMovement, amount, reason, reference.into(), at)
    }

    pub fn debit(
        &mut self,
        amount: Money,
        reason: LedgerReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        self.append(TransactionKind::Debit, Pool::InMovement, amount, reason, reference.into(), at)
    }

    /// Move the whole in-movement balance into the consolidated pool.
    ///
    /// A second call for the same period fails with `AlreadyConsolidated` and
    /// moves nothing; the first transfer stays readable via
    /// [`LedgerLog::consolidation_for`].
    pub fn consolidate_into(
        &mut self,
        period_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        if self.consolidations.contains_key(period_id) {
            return Err(DomainError::AlreadyConsolidated(period_id.to_string()));
        }

        let amount = self.state.in_movement;
        let tx = self.append(
            TransactionKind::Consolidation,
            Pool::Consolidated,
            amount,
            LedgerReason::PeriodConsolidated,
            period_id.to_string(),
            at,
        )?;
        self.consolidations
            .insert(period_id.to_string(), self.transactions.len() - 1);
        Ok(tx)
    }

    pub fn consolidation_for(&self, period_id: &str) -> Option<&LedgerTransaction> {
        self.consolidations
            .get(period_id)
            .and_then(|idx| self.transactions.get(*idx))
    }

    /// Rebuild balances from an arbitrary log, starting from zero.
    pub fn replay<'a>(
        currency: Currency,
        transactions: impl IntoIterator<Item = &'a LedgerTransaction>,
    ) -> DomainResult<LedgerState> {
        let mut state = LedgerState::empty(currency);
        for tx in transactions {
            if tx.amount.currency() != currency {
                return Err(DomainError::CurrencyMismatch {
                    left: currency,
                    right: tx.amount.currency(),
                });
            }
            state.apply(tx)?;
        }
        Ok(state)
    }

    /// Audit: the live fold must equal a fresh replay of the log.
    pub fn verify(&self) -> DomainResult<()> {
        let replayed = Self::replay(self.currency, &self.transactions)?;
        if replayed != self.state {
            return Err(DomainError::invariant(format!(
                "ledger {} diverged from its log: live {:?}, replayed {:?}",
                self.currency.code(),
                self.state,
                replayed
            )));
        }
        Ok(())
    }

    fn append(
        &mut self,
        kind: TransactionKind,
        pool: Pool,
        amount: Money,
        reason: LedgerReason,
        reference: String,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerTransaction> {
        if amount.currency() != self.currency {
            return Err(DomainError::CurrencyMismatch {
                left: self.currency,
                right: amount.currency(),
            });
        }
        if kind != TransactionKind::Consolidation && amount.is_negative() {
            return Err(DomainError::validation(
                "ledger credit/debit amounts must be non-negative",
            ));
        }

        let tx = LedgerTransaction {
            sequence: self.state.counters.last_sequence + 1,
            kind,
            pool,
            amount,
            reason,
            reference,
            recorded_at: at,
        };
        // Fold first so a failing fold leaves the log untouched.
        let mut next = self.state.clone();
        next.apply(&tx)?;
        self.state = next;
        self.transactions.push(tx.clone());
        Ok(tx)
    }
}
