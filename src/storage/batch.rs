//! Batched JSONL writes.
//!
//! Finished records travel over an unbounded channel to a single writer task
//! that buffers them and appends them to the output file as JSON lines.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::config::BATCH_SIZE;
use crate::error_handling::StorageError;

/// Configuration for batch writing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of records to buffer before appending
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_size: BATCH_SIZE,
        }
    }
}

/// Summary of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// Records taken from the buffer
    pub total: usize,
    /// Records written
    pub successful: usize,
    /// Records that failed to serialize
    pub failed: usize,
}

/// Batch writer that collects records and appends them in batches
pub struct BatchWriter<T> {
    path: PathBuf,
    config: BatchConfig,
    buffer: Vec<T>,
    written: usize,
    _record: PhantomData<fn(T)>,
}

impl<T: Serialize> BatchWriter<T> {
    /// Creates a writer appending to `path`. The file is created on first flush.
    pub fn new(path: impl Into<PathBuf>, config: BatchConfig) -> Self {
        BatchWriter {
            path: path.into(),
            config,
            buffer: Vec::new(),
            written: 0,
            _record: PhantomData,
        }
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Adds a record to the buffer and flushes if needed
    pub async fn add_record(&mut self, record: T) -> Result<(), StorageError> {
        self.buffer.push(record);

        if self.buffer.len() >= self.config.batch_size.max(1) {
            self.flush().await?;
        }

        Ok(())
    }

    /// Appends all buffered records to the output file.
    ///
    /// A record that fails to serialize is logged and skipped; the rest of
    /// the batch is still written.
    pub async fn flush(&mut self) -> Result<FlushResult, StorageError> {
        if self.buffer.is_empty() {
            return Ok(FlushResult::default());
        }

        let total = self.buffer.len();
        log::debug!("Flushing batch of {} records to {}", total, self.path.display());

        let mut payload = Vec::new();
        let mut failed = 0;
        for record in self.buffer.drain(..) {
            match serde_json::to_vec(&record) {
                Ok(line) => {
                    payload.extend_from_slice(&line);
                    payload.push(b'\n');
                }
                Err(e) => {
                    log::error!("Failed to serialize record: {}", e);
                    failed += 1;
                }
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&payload).await?;
        file.flush().await?;

        let result = FlushResult {
            total,
            successful: total - failed,
            failed,
        };
        self.written += result.successful;

        if failed > 0 {
            log::warn!(
                "Flush completed: {} successful, {} failed out of {} total",
                result.successful,
                result.failed,
                result.total
            );
        } else {
            log::debug!("Successfully flushed {} records", result.successful);
        }

        Ok(result)
    }
}

/// Starts the batch writer task that processes records from a channel.
///
/// Returns a sender for finished records and a handle resolving to the number
/// of records written once every sender is dropped and the final batch is
/// flushed.
pub fn start_batch_writer<T>(
    path: impl Into<PathBuf>,
    config: BatchConfig,
) -> (
    mpsc::UnboundedSender<T>,
    tokio::task::JoinHandle<Result<usize, StorageError>>,
)
where
    T: Serialize + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();
    let mut writer = BatchWriter::new(path, config);

    let handle = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            if let Err(e) = writer.add_record(record).await {
                log::error!("Error appending batch to {}: {}", writer.path().display(), e);
            }
        }

        log::debug!("Batch writer channel closed, flushing remaining records");
        if let Err(e) = writer.flush().await {
            log::error!("Error flushing final batch: {}", e);
            return Err(e);
        }
        Ok(writer.written())
    });

    (tx, handle)
}
