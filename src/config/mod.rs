//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, loop bounds, pool sizes)
//! - Log option enums and the library `Config` struct

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, LogFormat, LogLevel};
