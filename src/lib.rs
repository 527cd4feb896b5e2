//! mailconf_scan library: multi-mechanism mail configuration discovery
//!
//! This library discovers how a mail domain claims its mail servers should be
//! reached, through Autodiscover, Autoconfig, SRV records and brute-force
//! host guessing, validates the TLS certificates presented along the way and
//! cross-checks the answers for consistency.
//!
//! # Example
//!
//! ```no_run
//! use mailconf_scan::{Config, run_scan};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     input: std::path::PathBuf::from("domains.csv"),
//!     output: std::path::PathBuf::from("init.jsonl"),
//!     max_concurrency: 50,
//!     ..Default::default()
//! };
//!
//! let report = run_scan(config).await?;
//! println!("Scanned {} domains into {}", report.total_domains, report.output.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

#![warn(missing_docs)]

pub mod autoconfig;
pub mod autodiscover;
pub mod check;
pub mod config;
pub mod discover;
pub mod dns;
mod error_handling;
pub mod guess;
pub mod initialization;
pub mod input;
pub mod models;
pub mod probe;
pub mod srv;
pub mod storage;
pub mod tls;
mod xml;

// Re-export public API
pub use check::{check_domain, diff_domain, StatsReport};
pub use config::{Config, LogFormat, LogLevel};
pub use discover::{process_domain, ScanContext};
pub use error_handling::{
    DnsError, ErrorType, InitializationError, ProbeError, ProcessingStats, StorageError, XmlError,
};
pub use models::*;
pub use probe::{ProbeMode, ProbeRunner};
pub use run::{run_check, run_diff, run_scan, run_stats, PassReport, ScanReport};
pub use tls::{CertificateValidator, TrustAnchors};

// Internal run module (scan and offline passes)
mod run {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::{Context, Result};
    use futures::stream::FuturesUnordered;
    use futures::StreamExt;
    use log::{info, warn};
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::check::{check_domain, diff_domain, StatsReport};
    use crate::config::{Config, LOGGING_INTERVAL};
    use crate::discover::{process_domain, ScanContext};
    use crate::error_handling::{update_error_stats, ProcessingStats, StorageError};
    use crate::initialization::{init_crypto_provider, init_semaphore};
    use crate::input::{count_domains, DomainReader};
    use crate::models::{DomainCheckDifResult, DomainCheckResult, DomainResult};
    use crate::storage::{start_batch_writer, BatchConfig, BatchWriter, JsonlReader};

    /// Results of a scanning run.
    #[derive(Debug, Clone)]
    pub struct ScanReport {
        /// Domains read from the input
        pub total_domains: usize,
        /// Domains whose record reached the writer
        pub completed: usize,
        /// Domains whose task panicked
        pub failed: usize,
        /// Records appended to the output
        pub written: usize,
        /// JSONL file the records were appended to
        pub output: PathBuf,
        /// Elapsed time in seconds
        pub elapsed_seconds: f64,
    }

    /// Results of an offline pass over a JSONL file.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct PassReport {
        /// Records read from the input
        pub read: usize,
        /// Input lines that could not be parsed
        pub skipped: usize,
        /// Records written to the output
        pub written: usize,
        /// Elapsed time in seconds
        pub elapsed_seconds: f64,
    }

    fn log_progress(start_time: Instant, completed: usize, total: usize) {
        let elapsed_secs = start_time.elapsed().as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            completed as f64 / elapsed_secs
        } else {
            0.0
        };
        info!(
            "Processed {}/{} domains in {:.2} seconds (~{:.2} domains/sec)",
            completed, total, elapsed_secs, rate
        );
    }

    /// Scans every domain of `config.input` and appends one `DomainResult`
    /// per domain to `config.output`.
    ///
    /// Domains are processed concurrently, at most `config.max_concurrency` at
    /// a time. The run waits for every launched task before returning.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The input file cannot be opened
    /// - The HTTP client or resolver address cannot be initialized
    /// - The final batch cannot be written
    pub async fn run_scan(config: Config) -> Result<ScanReport> {
        init_crypto_provider();

        let total_domains =
            count_domains(&config.input).context("Failed to open input file for counting")?;
        info!("Total domains in {}: {}", config.input.display(), total_domains);

        let domains = DomainReader::open(&config.input).context("Failed to open input file")?;
        let ctx = Arc::new(ScanContext::new(&config).context("Failed to initialize resolvers")?);
        let (sender, writer) = start_batch_writer::<DomainResult>(
            &config.output,
            BatchConfig {
                batch_size: config.batch_size,
            },
        );

        let semaphore = init_semaphore(config.max_concurrency);
        let error_stats = Arc::new(ProcessingStats::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let start_time = Instant::now();
        let mut tasks = FuturesUnordered::new();

        for entry in domains {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Semaphore closed, skipping domain: {}", entry.domain);
                    continue;
                }
            };

            let ctx = Arc::clone(&ctx);
            let sender = sender.clone();
            let error_stats = Arc::clone(&error_stats);
            let completed = Arc::clone(&completed);
            tasks.push(tokio::spawn(async move {
                let _permit = permit;

                let result = process_domain(&ctx, entry.id, &entry.domain).await;
                update_error_stats(&error_stats, &result);
                if sender.send(result).is_err() {
                    log::error!("{} for {}", StorageError::WriterClosed, entry.domain);
                    return;
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % LOGGING_INTERVAL == 0 {
                    log_progress(start_time, done, total_domains);
                }
            }));
        }

        let mut failed = 0;
        while let Some(task_result) = tasks.next().await {
            if let Err(join_error) = task_result {
                failed += 1;
                warn!("Task panicked: {:?}", join_error);
            }
        }

        drop(sender);
        let written = writer
            .await
            .context("Batch writer task failed")?
            .context("Failed to write final batch")?;

        let completed = completed.load(Ordering::SeqCst);
        log_progress(start_time, completed, total_domains);
        error_stats.log_summary();
        info!("Results saved to {}", config.output.display());

        Ok(ScanReport {
            total_domains,
            completed,
            failed,
            written,
            output: config.output,
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
        })
    }

    /// Streams `input`, maps each record through `transform` and writes the
    /// produced records to `output`.
    async fn run_pass<I, O>(
        input: &Path,
        output: &Path,
        batch_size: usize,
        transform: impl Fn(&I) -> Option<O>,
    ) -> Result<PassReport>
    where
        I: DeserializeOwned,
        O: Serialize,
    {
        let start_time = Instant::now();
        let mut reader = JsonlReader::<I>::open(input)
            .await
            .with_context(|| format!("Failed to open {}", input.display()))?;
        let mut writer = BatchWriter::new(output, BatchConfig { batch_size });
        let mut report = PassReport::default();

        while let Some(record) = reader
            .next_record()
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?
        {
            report.read += 1;
            if let Some(out) = transform(&record) {
                writer
                    .add_record(out)
                    .await
                    .with_context(|| format!("Failed to write {}", output.display()))?;
            }
            if report.read % LOGGING_INTERVAL == 0 {
                log::debug!("Read {} records from {}", report.read, input.display());
            }
        }
        writer
            .flush()
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;

        report.skipped = reader.skipped();
        report.written = writer.written();
        report.elapsed_seconds = start_time.elapsed().as_secs_f64();
        info!(
            "Read {} records ({} skipped), wrote {} to {}",
            report.read,
            report.skipped,
            report.written,
            output.display()
        );
        Ok(report)
    }

    /// Normalizes every scan record of `input` and writes one
    /// `DomainCheckResult` per domain with something to check.
    pub async fn run_check(input: &Path, output: &Path, batch_size: usize) -> Result<PassReport> {
        run_pass::<DomainResult, DomainCheckResult>(input, output, batch_size, check_domain).await
    }

    /// Runs the port-usage diff over every scan record of `input`.
    pub async fn run_diff(input: &Path, output: &Path, batch_size: usize) -> Result<PassReport> {
        run_pass::<DomainResult, DomainCheckDifResult>(input, output, batch_size, diff_domain).await
    }

    /// Counts the check records of every file in `inputs`.
    ///
    /// Each file yields its own `StatsReport`; the returned report is their merge.
    pub async fn run_stats(inputs: &[PathBuf]) -> Result<StatsReport> {
        let mut total = StatsReport::new();
        for input in inputs {
            let mut reader = JsonlReader::<DomainCheckResult>::open(input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let mut report = StatsReport::new();
            while let Some(record) = reader
                .next_record()
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?
            {
                report.add(&record);
            }
            info!(
                "{}: {} check records ({} skipped)",
                input.display(),
                report.records,
                reader.skipped()
            );
            total.merge(&report);
        }
        Ok(total)
    }
}
