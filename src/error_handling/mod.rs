//! Error handling and processing statistics.
//!
//! This module provides:
//! - Error type definitions for the fallible building blocks
//! - Per-attempt failure categorization (`ErrorType`)
//! - Processing statistics tracking
//! - Retry strategy configuration
//!
//! Attempt-level failures are data, not control flow: resolvers record them as
//! strings on the attempt record and the run counts them here.

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{categorize_attempt_error, get_retry_strategy, update_error_stats};
pub use stats::ProcessingStats;
pub use types::{DnsError, ErrorType, InitializationError, ProbeError, StorageError, XmlError};
