//! Per-month mutual exclusion for month-end work.
//!
//! Statement computation and period close both read and write the same
//! month's statements and ledger postings. Holding the month's lock for the
//! whole operation keeps a close from consolidating while a statement for that
//! month is half posted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use talentbill_accounting::PeriodId;
use talentbill_core::{DomainError, DomainResult};

#[derive(Debug, Default)]
pub struct PeriodLocks {
    locks: Mutex<HashMap<PeriodId, Arc<Mutex<()>>>>,
}

impl PeriodLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding `period`'s lock. Other months are not blocked.
    pub fn with<T>(&self, period: PeriodId, f: impl FnOnce() -> DomainResult<T>) -> DomainResult<T> {
        let lock = self
            .locks
            .lock()
            .map_err(|_| DomainError::invariant("period lock table poisoned"))?
            .entry(period)
            .or_default()
            .clone();
        let _guard = lock
            .lock()
            .map_err(|_| DomainError::invariant(format!("period {period} lock poisoned")))?;
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_month_waits_and_other_months_do_not() {
        let locks = Arc::new(PeriodLocks::new());
        let october = PeriodId::new(2025, 10).unwrap();
        let november = PeriodId::new(2025, 11).unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();

        let holder = {
            let locks = locks.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                locks.with(october, || {
                    entered_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(100));
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                })
            })
        };
        entered_rx.recv().unwrap();

        locks.with(november, || {
            assert!(!finished.load(Ordering::SeqCst));
            Ok(())
        })
        .unwrap();
        locks.with(october, || {
            assert!(finished.load(Ordering::SeqCst));
            Ok(())
        })
        .unwrap();
        holder.join().unwrap().unwrap();
    }

    #[test]
    fn error_from_the_closure_is_returned() {
        let locks = PeriodLocks::new();
        let period = PeriodId::new(2025, 10).unwrap();
        let err = locks
            .with(period, || -> DomainResult<()> { Err(DomainError::validation("nope")) })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        // The lock was released.
        locks.with(period, || Ok(())).unwrap();
    }
}
