//! External handshake probe.
//!
//! The probe is a separate executable that connects to `host:port` in one of
//! three modes and prints a single `ConnectInfo` JSON document on stdout. It is
//! treated as a black box; this module only runs it and interprets the result.

use std::process::Stdio;
use std::time::Duration;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use tokio::process::Command;

use crate::config::PROBE_TIMEOUT_SECS;
use crate::error_handling::ProbeError;
use crate::models::{ConnectDetail, ConnectInfo};

/// Connection mode requested from the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ProbeMode {
    /// Cleartext session
    Plain,
    /// Cleartext session upgraded with STARTTLS
    Starttls,
    /// Implicit TLS from the first byte
    Tls,
}

/// Runs the external probe executable.
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProbeRunner {
    /// `args` are passed before the probe parameters (e.g. a script path).
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }

    /// Overrides the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probes `host:port` once in `mode`.
    ///
    /// # Errors
    ///
    /// Fails when the probe cannot be run, exits unsuccessfully, prints
    /// something other than a `ConnectInfo` document, or reports failure.
    pub async fn run(
        &self,
        protocol: &str,
        host: &str,
        port: &str,
        mode: ProbeMode,
    ) -> Result<ConnectInfo, ProbeError> {
        let mode = mode.to_string();
        log::debug!("Probing {protocol}://{host}:{port} ({mode})");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(["--protocol", protocol, "--host", host, "--port", port, "--mode", mode.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ProbeError::Exit {
                status: output.status.to_string(),
                output: combined,
            });
        }

        let info: ConnectInfo = serde_json::from_slice(&output.stdout)?;
        if !info.success {
            return Err(ProbeError::Failed(info.error));
        }
        Ok(info)
    }

    /// Probes `host:port` in every mode.
    ///
    /// A failed mode is recorded as an unsuccessful `ConnectInfo` carrying the
    /// error text.
    pub async fn probe_all_modes(&self, protocol: &str, host: &str, port: &str) -> ConnectDetail {
        let mut detail = ConnectDetail {
            protocol_type: protocol.to_string(),
            host: host.to_string(),
            port: port.to_string(),
            ..Default::default()
        };

        for mode in ProbeMode::iter() {
            let info = match self.run(protocol, host, port, mode).await {
                Ok(info) => info,
                Err(e) => {
                    log::debug!("Probe {host}:{port} ({mode}) failed: {e}");
                    ConnectInfo {
                        success: false,
                        info: None,
                        error: e.to_string(),
                    }
                }
            };
            match mode {
                ProbeMode::Plain => detail.plain = info,
                ProbeMode::Starttls => detail.starttls = info,
                ProbeMode::Tls => detail.tls = info,
            }
        }
        detail
    }
}
