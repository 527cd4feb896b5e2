//! Domain list ingestion.
//!
//! The input is a delimited file without a header whose second column holds
//! the domain name (for example a ranked list of `rank,domain` rows). Blank
//! lines, `#` comments and rows with fewer than two columns are skipped.

use std::fs::File;
use std::path::Path;

use crate::error_handling::StorageError;

/// A domain read from the input, with its 1-based row position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDomain {
    /// Row position, counting every data row including skipped short ones
    pub id: u64,
    /// Trimmed domain name
    pub domain: String,
}

/// Streams `InputDomain`s from a delimited file.
///
/// Reading stops at the first malformed record, which is logged.
pub struct DomainReader {
    records: csv::StringRecordsIntoIter<File>,
    row: u64,
}

impl DomainReader {
    /// Opens `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_path(path)?;
        Ok(Self {
            records: reader.into_records(),
            row: 0,
        })
    }
}

impl Iterator for DomainReader {
    type Item = InputDomain;

    fn next(&mut self) -> Option<InputDomain> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Stopping input at row {}: {}", self.row + 1, e);
                    return None;
                }
            };
            self.row += 1;

            let Some(domain) = record.get(1).map(str::trim) else {
                continue;
            };
            if domain.is_empty() {
                continue;
            }
            return Some(InputDomain {
                id: self.row,
                domain: domain.to_string(),
            });
        }
    }
}

/// Number of domains `path` would yield.
pub fn count_domains(path: &Path) -> Result<usize, StorageError> {
    Ok(DomainReader::open(path)?.count())
}
