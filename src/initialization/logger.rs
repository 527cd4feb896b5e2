//! Logger initialization.
//!
//! Log lines come in two shapes: colored plain text for terminals and one JSON
//! object per line for collectors. `RUST_LOG` is read first; the CLI level then
//! applies to this crate and to everything not quieted below.

use std::io::{self, Write};

use crate::config::LogFormat;
use crate::error_handling::InitializationError;
use colored::*;
use log::{Level, LevelFilter, Record};

/// Dependencies whose chatter is capped regardless of the requested level.
///
/// Handshakes against misconfigured mail hosts and malformed DNS answers are
/// routine during a scan and are already reported in the result records.
const QUIETED_MODULES: &[(&str, LevelFilter)] = &[
    ("reqwest", LevelFilter::Info),
    ("hyper", LevelFilter::Info),
    ("hyper_util", LevelFilter::Info),
    ("rustls", LevelFilter::Error),
    ("hickory_proto", LevelFilter::Error),
    ("hickory_client", LevelFilter::Error),
];

/// Initializes the logger with the specified level and format.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// # RUST_LOG alone is enough for a quick look
/// RUST_LOG=debug mailconf_scan scan domains.csv
///
/// # --log-level wins for this crate
/// RUST_LOG=debug mailconf_scan --log-level info scan domains.csv
///
/// # Per-module filtering
/// RUST_LOG=mailconf_scan::dns=trace mailconf_scan scan domains.csv
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(true);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for (module, cap) in QUIETED_MODULES {
        builder.filter_module(module, (*cap).min(level));
    }
    builder.filter_module(env!("CARGO_CRATE_NAME"), level);

    match format {
        LogFormat::Json => builder.format(|buf, record| {
            write_json_line(buf, record, chrono::Utc::now().timestamp_millis())
        }),
        LogFormat::Plain => builder.format(|buf, record| write_plain_line(buf, record)),
    };

    builder.try_init().map_err(InitializationError::from)
}

/// `{"ts":..,"level":..,"target":..,"msg":..}` followed by a newline.
fn write_json_line(out: &mut impl Write, record: &Record<'_>, ts_millis: i64) -> io::Result<()> {
    let line = serde_json::json!({
        "ts": ts_millis,
        "level": record.level().as_str(),
        "target": record.target(),
        "msg": record.args().to_string(),
    });
    writeln!(out, "{line}")
}

/// `<marker> <target> [LEVEL] message`, with targets inside this crate shown
/// relative to it.
fn write_plain_line(out: &mut impl Write, record: &Record<'_>) -> io::Result<()> {
    let level = record.level();
    let (marker, label) = match level {
        Level::Error => ("❌", level.as_str().red()),
        Level::Warn => ("⚠️", level.as_str().yellow()),
        Level::Info => ("✔️", level.as_str().green()),
        Level::Debug => ("🔍", level.as_str().blue()),
        Level::Trace => ("🔬", level.as_str().purple()),
    };
    let target = record.target();
    let target = target
        .strip_prefix(concat!(env!("CARGO_CRATE_NAME"), "::"))
        .unwrap_or(target);

    writeln!(out, "{marker} {} [{label}] {}", target.cyan(), record.args())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<F>(write: F, level: Level, target: &str, msg: &str) -> String
    where
        F: Fn(&mut Vec<u8>, &Record<'_>) -> io::Result<()>,
    {
        let mut out = Vec::new();
        write(
            &mut out,
            &Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{msg}"))
                .build(),
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_json_line_escapes_message() {
        let line = render(
            |out, record| write_json_line(out, record, 1_700_000_000_000),
            Level::Warn,
            "mailconf_scan::dns",
            "bad \"answer\"\nfor example.com",
        );
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["ts"], 1_700_000_000_000i64);
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["target"], "mailconf_scan::dns");
        assert_eq!(value["msg"], "bad \"answer\"\nfor example.com");
    }

    #[test]
    fn test_plain_line_shortens_crate_targets() {
        let line = render(
            |out, record| write_plain_line(out, record),
            Level::Info,
            "mailconf_scan::srv",
            "3 records",
        );
        assert!(line.starts_with("✔️ "));
        assert!(line.contains("srv"));
        assert!(!line.contains("mailconf_scan"));
        assert!(line.contains("INFO"));
        assert!(line.ends_with("] 3 records\n"));

        let line = render(
            |out, record| write_plain_line(out, record),
            Level::Error,
            "reqwest::connect",
            "refused",
        );
        assert!(line.starts_with("❌ "));
        assert!(line.contains("reqwest::connect"));
    }

    #[test]
    fn test_second_init_reports_logger_error() {
        let _ = init_logger_with(LevelFilter::Warn, LogFormat::Plain);
        let again = init_logger_with(LevelFilter::Warn, LogFormat::Json);
        assert!(matches!(again, Err(InitializationError::LoggerError(_))));
    }
}
