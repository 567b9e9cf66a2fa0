//! Human-facing invoice numbers: `PREFIX-YEAR-SEQ`.
//!
//! Sequential numbers pad the sequence to five digits (`INV-2025-00042`).
//! Numbers minted by the allocator's contention fallback carry a `T` marker
//! and a timestamp instead (`INV-T-2025-1761000000123456007`) so they can never
//! collide with, or be mistaken for, a sequential number.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn sequential(prefix: &str, year: i32, sequence: u32) -> Self {
        Self(format!("{prefix}-{year}-{sequence:05}"))
    }

    /// Timestamp-derived number; `discriminator` separates numbers minted in
    /// the same microsecond.
    pub fn fallback(prefix: &str, year: i32, micros: i64, discriminator: u32) -> Self {
        Self(format!("{prefix}-T-{year}-{micros}{discriminator:03}"))
    }

    /// Sequence of a sequential number for `prefix`/`year`; `None` for
    /// fallback numbers or other prefixes/years.
    pub fn sequence_for(&self, prefix: &str, year: i32) -> Option<u32> {
        let rest = self.0.strip_prefix(prefix)?.strip_prefix('-')?;
        let rest = rest.strip_prefix(&year.to_string())?.strip_prefix('-')?;
        rest.parse().ok()
    }

    pub fn is_fallback(&self) -> bool {
        self.0.contains("-T-")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_format_and_parse() {
        let n = InvoiceNumber::sequential("INV", 2025, 42);
        assert_eq!(n.as_str(), "INV-2025-00042");
        assert_eq!(n.sequence_for("INV", 2025), Some(42));
        assert_eq!(n.sequence_for("INV", 2024), None);
        assert_eq!(n.sequence_for("CR", 2025), None);
        assert!(!n.is_fallback());
    }

    #[test]
    fn fallback_numbers_are_not_sequential() {
        let n = InvoiceNumber::fallback("INV", 2025, 1_761_000_000_123_456, 7);
        assert_eq!(n.as_str(), "INV-T-2025-1761000000123456007");
        assert_eq!(n.sequence_for("INV", 2025), None);
        assert!(n.is_fallback());
    }
}
