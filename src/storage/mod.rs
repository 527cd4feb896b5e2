//! Result persistence.
//!
//! Scan and pass outputs are append-only JSONL files: one record per line,
//! written in batches by a dedicated task and read back line by line.

pub mod batch;
pub mod jsonl;

pub use batch::{start_batch_writer, BatchConfig, BatchWriter, FlushResult};
pub use jsonl::JsonlReader;
