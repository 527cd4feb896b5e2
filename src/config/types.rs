//! Configuration types and CLI option enums.

use std::path::PathBuf;

use clap::ValueEnum;

use crate::config::constants::{
    BATCH_SIZE, DEFAULT_PROBE_PROGRAM, DEFAULT_RESOLVER, DOMAIN_CONCURRENCY, GUESS_CONCURRENCY,
    HTTP_TIMEOUT_SECS,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Library configuration (no CLI dependencies).
///
/// # Examples
///
/// ```no_run
/// use mailconf_scan::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     input: PathBuf::from("domains.csv"),
///     roots_pem: Some(PathBuf::from("roots.pem")),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Delimited file to read domains from (second column)
    pub input: PathBuf,

    /// JSONL file results are appended to
    pub output: PathBuf,

    /// PEM bundle of trusted roots; `None` makes every trust verdict fail closed
    pub roots_pem: Option<PathBuf>,

    /// Recursive resolver address (`ip:port`)
    pub resolver: String,

    /// Maximum number of domains processed concurrently
    pub max_concurrency: usize,

    /// Maximum number of concurrent TCP probes inside one guess pass
    pub guess_concurrency: usize,

    /// Per-request HTTP timeout in seconds
    pub timeout_seconds: u64,

    /// Records buffered before the output file is appended to
    pub batch_size: usize,

    /// External handshake probe executable
    pub probe_program: String,

    /// Arguments placed before `--protocol ...` (e.g. a script path)
    pub probe_args: Vec<String>,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("domains.csv"),
            output: PathBuf::from("results.jsonl"),
            roots_pem: None,
            resolver: DEFAULT_RESOLVER.to_string(),
            max_concurrency: DOMAIN_CONCURRENCY,
            guess_concurrency: GUESS_CONCURRENCY,
            timeout_seconds: HTTP_TIMEOUT_SECS,
            batch_size: BATCH_SIZE,
            probe_program: DEFAULT_PROBE_PROGRAM.to_string(),
            probe_args: Vec::new(),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}
