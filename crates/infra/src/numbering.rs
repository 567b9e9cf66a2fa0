//! Collision-safe invoice number allocation.
//!
//! Optimistic protocol: read the highest sequence for the year, propose the
//! next one, check it is free, then commit. A number found taken, or a commit
//! rejected by the store's unique constraint, counts as a collision and the
//! next sequence is tried. After [`MAX_ALLOCATION_ATTEMPTS`] collisions the
//! allocator mints a timestamp number instead of blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use talentbill_core::{DomainError, DomainResult};
use talentbill_invoicing::InvoiceNumber;

use crate::store::{InvoiceNumberIndex, StoreError};

/// Collisions tolerated before falling back to a timestamp number.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 10;

/// Wraps around well before the three digits reserved in fallback numbers.
const DISCRIMINATOR_MODULUS: u32 = 1_000;

pub struct InvoiceNumberAllocator<I: ?Sized = dyn InvoiceNumberIndex> {
    index: Arc<I>,
    prefix: String,
    discriminator: AtomicU32,
}

impl<I: InvoiceNumberIndex + ?Sized> InvoiceNumberAllocator<I> {
    pub fn new(index: Arc<I>, prefix: impl Into<String>) -> Self {
        Self {
            index,
            prefix: prefix.into(),
            discriminator: AtomicU32::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocate a number for `year` and commit it through `commit`.
    ///
    /// `commit` performs the write that claims the number (normally the
    /// invoice insert). Returning `StoreError::DuplicateNumber` from it is
    /// treated exactly like a detected collision. Any other error aborts.
    pub fn allocate_with<T, F>(
        &self,
        year: i32,
        now: DateTime<Utc>,
        mut commit: F,
    ) -> DomainResult<(InvoiceNumber, T)>
    where
        F: FnMut(&InvoiceNumber) -> Result<T, StoreError>,
    {
        match self.try_sequential(year, &mut commit) {
            Err(DomainError::NumberAllocationExhausted { attempts }) => {
                let number = self.fallback_number(year, now);
                warn!(
                    prefix = %self.prefix,
                    year,
                    attempts,
                    number = %number,
                    "invoice number contention; using timestamp fallback"
                );
                let value = commit(&number)?;
                Ok((number, value))
            }
            other => other,
        }
    }

    fn try_sequential<T, F>(&self, year: i32, commit: &mut F) -> DomainResult<(InvoiceNumber, T)>
    where
        F: FnMut(&InvoiceNumber) -> Result<T, StoreError>,
    {
        let mut sequence = self
            .index
            .highest_sequence(&self.prefix, year)?
            .unwrap_or(0)
            .saturating_add(1);

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = InvoiceNumber::sequential(&self.prefix, year, sequence);

            if self.index.number_exists(&candidate)? {
                debug!(number = %candidate, attempt, "invoice number taken; retrying");
                sequence = sequence.saturating_add(1);
                continue;
            }

            match commit(&candidate) {
                Ok(value) => return Ok((candidate, value)),
                Err(StoreError::DuplicateNumber(_)) => {
                    debug!(number = %candidate, attempt, "commit lost the race; retrying");
                    sequence = sequence.saturating_add(1);
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(DomainError::NumberAllocationExhausted {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    fn fallback_number(&self, year: i32, now: DateTime<Utc>) -> InvoiceNumber {
        let disc = self.discriminator.fetch_add(1, Ordering::Relaxed) % DISCRIMINATOR_MODULUS;
        InvoiceNumber::fallback(&self.prefix, year, now.timestamp_micros(), disc)
    }
}
