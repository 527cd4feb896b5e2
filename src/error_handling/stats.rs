//! Processing statistics tracking.
//!
//! Thread-safe counters for the failure categories observed while scanning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::ErrorType;

/// Thread-safe processing statistics tracker.
///
/// Every `ErrorType` is initialized to zero on creation, so counters can be
/// bumped concurrently from all domain tasks through a shared `Arc`.
pub struct ProcessingStats {
    errors: HashMap<ErrorType, AtomicUsize>,
}

impl ProcessingStats {
    /// Creates a tracker with every category at zero.
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for error in ErrorType::iter() {
            errors.insert(error, AtomicUsize::new(0));
        }
        ProcessingStats { errors }
    }

    /// Increment an error counter.
    pub fn increment_error(&self, error: ErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment error counter for {:?} which is not in the map",
                error
            );
        }
    }

    /// Get the count for an error type.
    pub fn get_error_count(&self, error: ErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Sum of all error counters.
    pub fn total_errors(&self) -> usize {
        self.errors.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Logs every non-zero counter, most frequent first.
    pub fn log_summary(&self) {
        let mut rows: Vec<(ErrorType, usize)> = ErrorType::iter()
            .map(|e| (e, self.get_error_count(e)))
            .filter(|(_, n)| *n > 0)
            .collect();
        if rows.is_empty() {
            log::info!("No attempt-level errors recorded");
            return;
        }
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        log::info!("Attempt-level errors ({} total):", self.total_errors());
        for (error, count) in rows {
            log::info!("   {}: {}", error, count);
        }
    }
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}
