//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `mailconf_scan` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use mailconf_scan::config::{
    BATCH_SIZE, DEFAULT_PROBE_PROGRAM, DEFAULT_RESOLVER, DOMAIN_CONCURRENCY, GUESS_CONCURRENCY,
    HTTP_TIMEOUT_SECS,
};
use mailconf_scan::initialization::{init_crypto_provider, init_logger_with};
use mailconf_scan::{
    run_check, run_diff, run_scan, run_stats, Config, LogFormat, LogLevel, ProbeMode, ProbeRunner,
};

#[derive(Debug, Parser)]
#[command(name = "mailconf_scan", version, about)]
struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover the mail configuration of every domain in a CSV file
    Scan(ScanArgs),
    /// Normalize scan records and flag inconsistent paths
    Check(PassArgs),
    /// Compare port usage within and across mechanisms
    Diff(PassArgs),
    /// Aggregate counters over check records
    Stats(StatsArgs),
    /// Run the external handshake probe against one endpoint
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// CSV file whose second column holds the domains
    input: PathBuf,

    /// JSONL file results are appended to
    #[arg(long, default_value = "init.jsonl")]
    output: PathBuf,

    /// PEM bundle of trusted root certificates
    #[arg(long)]
    roots: Option<PathBuf>,

    /// Recursive resolver (ip:port)
    #[arg(long, default_value = DEFAULT_RESOLVER)]
    resolver: String,

    /// Domains processed concurrently
    #[arg(long, default_value_t = DOMAIN_CONCURRENCY)]
    max_concurrency: usize,

    /// Concurrent connects inside one guess pass
    #[arg(long, default_value_t = GUESS_CONCURRENCY)]
    guess_concurrency: usize,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = HTTP_TIMEOUT_SECS)]
    timeout_seconds: u64,

    /// Records buffered before each append
    #[arg(long, default_value_t = BATCH_SIZE)]
    batch_size: usize,
}

#[derive(Debug, Args)]
struct PassArgs {
    /// Scan records (JSONL)
    input: PathBuf,

    /// Output file (JSONL)
    #[arg(long)]
    output: PathBuf,

    /// Records buffered before each append
    #[arg(long, default_value_t = BATCH_SIZE)]
    batch_size: usize,
}

#[derive(Debug, Args)]
struct StatsArgs {
    /// Check records (JSONL); reports of several files are merged
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write the report here instead of standard output
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    /// Protocol handed to the probe (imap, pop3, smtp)
    #[arg(long)]
    protocol: String,

    /// Host to connect to
    #[arg(long)]
    host: String,

    /// Port to connect to
    #[arg(long)]
    port: u16,

    /// Probe one mode only instead of all three
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ProbeMode>,

    /// Probe executable
    #[arg(long, default_value = DEFAULT_PROBE_PROGRAM)]
    program: String,

    /// Arguments placed before the probe parameters (repeatable)
    #[arg(long = "program-arg")]
    program_args: Vec<String>,
}

fn parse_mode(s: &str) -> Result<ProbeMode, String> {
    match s {
        "plain" => Ok(ProbeMode::Plain),
        "starttls" => Ok(ProbeMode::Starttls),
        "tls" => Ok(ProbeMode::Tls),
        other => Err(format!("unknown mode '{other}' (plain, starttls, tls)")),
    }
}

impl ScanArgs {
    fn into_config(self, log_level: LogLevel, log_format: LogFormat) -> Config {
        Config {
            input: self.input,
            output: self.output,
            roots_pem: self.roots,
            resolver: self.resolver,
            max_concurrency: self.max_concurrency,
            guess_concurrency: self.guess_concurrency,
            timeout_seconds: self.timeout_seconds,
            batch_size: self.batch_size,
            log_level,
            log_format,
            ..Default::default()
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scan(args) => {
            let config = args.into_config(cli.log_level, cli.log_format);
            let report = run_scan(config).await?;
            println!(
                "Scanned {} domain{} ({} written, {} failed) in {:.1}s",
                report.total_domains,
                if report.total_domains == 1 { "" } else { "s" },
                report.written,
                report.failed,
                report.elapsed_seconds
            );
            println!("Results saved in {}", report.output.display());
        }
        Command::Check(args) => {
            let report = run_check(&args.input, &args.output, args.batch_size).await?;
            println!(
                "Checked {} records, {} written to {}",
                report.read,
                report.written,
                args.output.display()
            );
        }
        Command::Diff(args) => {
            let report = run_diff(&args.input, &args.output, args.batch_size).await?;
            println!(
                "Diffed {} records, {} written to {}",
                report.read,
                report.written,
                args.output.display()
            );
        }
        Command::Stats(args) => {
            let report = run_stats(&args.inputs).await?;
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize statistics")?;
            match args.output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Probe(args) => {
            let runner = ProbeRunner::new(args.program, args.program_args);
            let port = args.port.to_string();
            let json = match args.mode {
                Some(mode) => {
                    let info = runner
                        .run(&args.protocol, &args.host, &port, mode)
                        .await
                        .with_context(|| format!("Probe of {}:{} failed", args.host, port))?;
                    serde_json::to_string_pretty(&info)
                }
                None => serde_json::to_string_pretty(
                    &runner.probe_all_modes(&args.protocol, &args.host, &port).await,
                ),
            }
            .context("Failed to serialize probe result")?;
            println!("{json}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    // Initialize crypto provider for TLS operations
    init_crypto_provider();

    if let Err(e) = run(cli).await {
        eprintln!("mailconf_scan error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["mailconf_scan", "scan", "domains.csv"]).unwrap();
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        let config = args.into_config(cli.log_level, cli.log_format);
        assert_eq!(config.input, PathBuf::from("domains.csv"));
        assert_eq!(config.output, PathBuf::from("init.jsonl"));
        assert_eq!(config.max_concurrency, 200);
        assert_eq!(config.batch_size, 500);
        assert!(config.roots_pem.is_none());
    }

    #[test]
    fn test_global_log_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mailconf_scan",
            "check",
            "init.jsonl",
            "--output",
            "check.jsonl",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn test_probe_mode_parsing() {
        let cli = Cli::try_parse_from([
            "mailconf_scan",
            "probe",
            "--protocol",
            "imap",
            "--host",
            "mail.example.com",
            "--port",
            "993",
            "--mode",
            "tls",
        ])
        .unwrap();
        let Command::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.mode, Some(ProbeMode::Tls));
        assert!(Cli::try_parse_from(["mailconf_scan", "probe", "--protocol", "imap", "--host", "h", "--port", "1", "--mode", "ssl"]).is_err());
    }

    #[test]
    fn test_stats_requires_input() {
        assert!(Cli::try_parse_from(["mailconf_scan", "stats"]).is_err());
    }
}
