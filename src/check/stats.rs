//! Aggregate statistics over check records.
//!
//! A pass returns a `StatsReport`; reports from separate inputs are combined
//! with `merge`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::normalize::VALID;
use crate::models::{DomainCheckResult, MethodConfig};

const PORT_BUCKETS: [&str; 11] = [
    "IMAP_143", "IMAP_993", "IMAP_unexp", "POP3_110", "POP3_995", "POP3_unexp", "SMTP_465",
    "SMTP_587", "SMTP_25", "SMTP_2525", "SMTP_unexp",
];

const SRV_SECURE_BUCKETS: [&str; 11] = [
    "IMAPS_143", "IMAPS_993", "IMAPS_unexp", "POP3S_110", "POP3S_995", "POP3S_unexp",
    "SMTPS_465", "SMTPS_587", "SMTPS_25", "SMTPS_2525", "SMTPS_unexp",
];

const AUTODISCOVER_COUNTERS: [&str; 16] = [
    "enc_ssl",
    "enc_tls",
    "enc_auto",
    "not_any_enc",
    "enc_not_valid",
    "ssl_on",
    "ssl_off",
    "ssl_default_on",
    "ssl_not_valid",
    "protocol_count",
    "OverallCheck_not_valid",
    "Error_root element <Autodiscover> lost",
    "Error_missing <Response> element",
    "Error_missing <Account> element",
    "Error_<AccountType> must be 'email'",
    "Error_<Action> must be 'settings'",
];

const AUTOCONFIG_COUNTERS: [&str; 9] = [
    "SSL",
    "TLS",
    "STARTTLS",
    "plain",
    "ssl_not_valid",
    "protocol_count",
    "finalStatus_not_valid",
    "Error_missing root element <clientConfig>",
    "Error_missing <emailProvider> element",
];

const SRV_COUNTERS: [&str; 2] = ["protocol_count", "OverallCheck_not_valid"];

/// Counters for one mechanism.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismStats {
    /// Domains with at least one result for the mechanism
    pub total: u64,
    /// Counter name to value; every known counter is present
    pub counts: BTreeMap<String, u64>,
}

impl MechanismStats {
    fn with_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            total: 0,
            counts: keys.into_iter().map(|k| (k.to_string(), 0)).collect(),
        }
    }

    fn bump(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
    }

    fn bump_all(&mut self, flags: BTreeSet<String>) {
        for flag in flags {
            self.bump(&flag);
        }
    }

    /// Adds `other`'s counters into `self`.
    pub fn merge(&mut self, other: &MechanismStats) {
        self.total += other.total;
        for (key, value) in &other.counts {
            *self.counts.entry(key.clone()).or_insert(0) += value;
        }
    }
}

/// Statistics of one pass over check records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Records read
    pub records: u64,
    /// Autodiscover counters
    pub autodiscover: MechanismStats,
    /// Autoconfig counters
    pub autoconfig: MechanismStats,
    /// SRV counters
    pub srv: MechanismStats,
}

impl Default for StatsReport {
    fn default() -> Self {
        Self {
            records: 0,
            autodiscover: MechanismStats::with_keys(
                PORT_BUCKETS.into_iter().chain(AUTODISCOVER_COUNTERS),
            ),
            autoconfig: MechanismStats::with_keys(
                PORT_BUCKETS.into_iter().chain(AUTOCONFIG_COUNTERS),
            ),
            srv: MechanismStats::with_keys(
                PORT_BUCKETS
                    .into_iter()
                    .chain(SRV_SECURE_BUCKETS)
                    .chain(SRV_COUNTERS),
            ),
        }
    }
}

/// `LABEL_port` or `LABEL_unexp` for a protocol label, `None` for labels that
/// are not counted.
fn port_bucket(label: &str, port: &str) -> Option<String> {
    let known: &[&str] = match label {
        "IMAP" | "IMAPS" => &["143", "993"],
        "POP3" | "POP3S" => &["110", "995"],
        "SMTP" | "SMTPS" => &["465", "587", "25", "2525"],
        _ => return None,
    };
    Some(if known.contains(&port) {
        format!("{label}_{port}")
    } else {
        format!("{label}_unexp")
    })
}

impl StatsReport {
    /// Creates a report with every known counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &StatsReport) {
        self.records += other.records;
        self.autodiscover.merge(&other.autodiscover);
        self.autoconfig.merge(&other.autoconfig);
        self.srv.merge(&other.srv);
    }

    /// Counts one check record.
    pub fn add(&mut self, record: &DomainCheckResult) {
        self.records += 1;

        if !record.autodiscover_check_result.is_empty() {
            self.autodiscover.total += 1;
        }
        for method in &record.autodiscover_check_result {
            self.add_autodiscover(method);
        }

        if !record.autoconfig_check_result.is_empty() {
            self.autoconfig.total += 1;
        }
        for method in &record.autoconfig_check_result {
            self.add_autoconfig(method);
        }

        if let Some(srv) = &record.srv_check_result {
            self.srv.total += 1;
            self.add_srv(srv);
        }
    }

    fn add_autodiscover(&mut self, method: &MethodConfig) {
        let stats = &mut self.autodiscover;
        if method.overall_check != VALID {
            stats.bump("OverallCheck_not_valid");
            let error = match method.overall_check.as_str() {
                "Invalid, root element <Autodiscover> lost" => {
                    Some("Error_root element <Autodiscover> lost")
                }
                "Invalid, <Response> element lost" => Some("Error_missing <Response> element"),
                "Invalid, missing <Account> element" => Some("Error_missing <Account> element"),
                "Invalid, <AccountType> must be 'email'" => {
                    Some("Error_<AccountType> must be 'email'")
                }
                "Invalid, <Action> must be 'settings'" => Some("Error_<Action> must be 'settings'"),
                _ => None,
            };
            if let Some(error) = error {
                stats.bump(error);
            }
        }

        let mut flags = BTreeSet::new();
        for p in &method.protocols {
            let flag = if p.encryption.is_empty() {
                match p.ssl.as_str() {
                    "off" => "ssl_off",
                    "on" => "ssl_on",
                    "default(on)" => "ssl_default_on",
                    _ => "ssl_not_valid",
                }
            } else {
                match p.encryption.as_str() {
                    "SSL" => "enc_ssl",
                    "TLS" => "enc_tls",
                    "Auto" => "enc_auto",
                    "None" => "not_any_enc",
                    _ => "enc_not_valid",
                }
            };
            flags.insert(flag.to_string());

            if matches!(p.protocol_type.as_str(), "IMAP" | "POP3" | "SMTP") {
                stats.bump("protocol_count");
                flags.extend(port_bucket(&p.protocol_type, &p.port));
            }
        }
        stats.bump_all(flags);
    }

    fn add_autoconfig(&mut self, method: &MethodConfig) {
        let stats = &mut self.autoconfig;
        if method.overall_check != VALID {
            stats.bump("finalStatus_not_valid");
            match method.overall_check.as_str() {
                "Invalid, root element <clientConfig> lost" => {
                    stats.bump("Error_missing root element <clientConfig>")
                }
                "Invalid, <emailProvider> element lost" => {
                    stats.bump("Error_missing <emailProvider> element")
                }
                _ => {}
            }
            return;
        }

        let mut flags = BTreeSet::new();
        for p in &method.protocols {
            let flag = match p.ssl.to_lowercase().as_str() {
                "ssl" => "SSL",
                "tls" => "TLS",
                "starttls" => "STARTTLS",
                "plain" => "plain",
                _ => "ssl_not_valid",
            };
            flags.insert(flag.to_string());

            let label = p.protocol_type.to_uppercase();
            if matches!(label.as_str(), "IMAP" | "POP3" | "SMTP") {
                stats.bump("protocol_count");
                flags.extend(port_bucket(&label, &p.port));
            }
        }
        stats.bump_all(flags);
    }

    fn add_srv(&mut self, method: &MethodConfig) {
        let stats = &mut self.srv;
        if method.overall_check != VALID {
            stats.bump("OverallCheck_not_valid");
        }

        let mut flags = BTreeSet::new();
        for p in &method.protocols {
            if let Some(bucket) = port_bucket(&p.protocol_type, &p.port) {
                stats.bump("protocol_count");
                flags.insert(bucket);
            }
        }
        stats.bump_all(flags);
    }
}

impl Extend<DomainCheckResult> for StatsReport {
    fn extend<I: IntoIterator<Item = DomainCheckResult>>(&mut self, iter: I) {
        for record in iter {
            self.add(&record);
        }
    }
}
