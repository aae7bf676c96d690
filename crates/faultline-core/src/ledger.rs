//! Deduplication ledger for feature rows.
//!
//! The ledger remembers every feature row ever submitted to the model during
//! the lifetime of the process, so the same use site is never sent twice. It
//! is append-only and never pruned.
//!
//! One ledger is shared (behind an `Arc`) by every predictor in the process;
//! tests construct their own.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Process-wide set of previously emitted feature rows (exact text match).
#[derive(Debug, Default)]
pub struct DeduplicationLedger {
    rows: Mutex<HashSet<String>>,
}

impl DeduplicationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `row` has already been emitted.
    pub fn seen(&self, row: &str) -> bool {
        self.lock().contains(row)
    }

    /// Record `row` as emitted.
    pub fn mark_seen(&self, row: &str) {
        self.lock().insert(row.to_string());
    }

    /// Atomically check and record `row`.
    ///
    /// Returns `true` if the row was new (and is now recorded), `false` if it
    /// had already been emitted. Two callers racing on the same row get exactly
    /// one `true` between them.
    pub fn check_and_mark(&self, row: &str) -> bool {
        let mut rows = self.lock();
        if rows.contains(row) {
            return false;
        }
        rows.insert(row.to_string())
    }

    /// Number of rows recorded so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A poisoned lock still holds a valid set: inserts are single calls.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
