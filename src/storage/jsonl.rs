//! Line-by-line reading of JSONL result files.

use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error_handling::StorageError;

/// Streams records from a JSONL file.
///
/// Blank lines are ignored. Lines that do not deserialize are logged and
/// counted in `skipped`.
pub struct JsonlReader<T> {
    lines: Lines<BufReader<tokio::fs::File>>,
    line_no: usize,
    skipped: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Opens `path` for reading.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            skipped: 0,
            _record: PhantomData,
        })
    }

    /// Next parsable record, or `None` at end of file.
    pub async fn next_record(&mut self) -> Result<Option<T>, StorageError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    log::warn!("Skipping line {}: {}", self.line_no, e);
                    self.skipped += 1;
                }
            }
        }
        Ok(None)
    }

    /// Lines that could not be parsed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
