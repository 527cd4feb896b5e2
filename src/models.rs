//! Record types written to and read from the JSONL result files.
//!
//! Field names follow the established on-disk format, so older result files
//! stay readable: absent or `null` collections decode as empty and empty
//! error strings decode as `None`.

use serde::{Deserialize, Deserializer, Serialize};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One transport hop observed while querying a URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    /// URL that was requested
    #[serde(rename = "URL")]
    pub url: String,
    /// HTTP status it answered with
    #[serde(rename = "Status")]
    pub status: u16,
}

/// Facts derived from a completed TLS handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CertInfo {
    /// Chain verified against the root bundle
    pub is_trusted: bool,
    /// Verification error text when not trusted
    pub verify_error: String,
    /// Leaf covers the connection hostname
    pub is_hostname_match: bool,
    /// `"yes"`, `"not"` or `"single"`
    pub is_in_order: String,
    /// Leaf not-after lies in the past
    pub is_expired: bool,
    /// Leaf is self-signed
    pub is_self_signed: bool,
    /// Leaf signature algorithm name
    pub signature_alg: String,
    /// Weak key or algorithm warning, empty when none
    pub alg_warning: String,
    /// Negotiated protocol version wire code (e.g. 0x0304)
    #[serde(rename = "TLSVersion")]
    pub tls_version: u16,
    /// Leaf subject common name
    pub subject: String,
    /// Leaf issuer common name
    pub issuer: String,
    /// Base64 DER of every presented certificate, leaf first
    #[serde(deserialize_with = "null_as_default")]
    pub raw_certs: Vec<String>,
}

/// Record of one discovery query attempt (Autodiscover or Autoconfig).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAttempt {
    /// Domain being scanned
    pub domain: String,
    /// Strategy label (`POST`, `srv-post`, `directurl`, `ISPDB`, ...)
    pub method: String,
    /// Ordinal within the strategy; 0 when the strategy has one attempt
    pub index: u32,
    /// URI the attempt started from
    pub uri: String,
    /// Every hop in request order
    #[serde(default, deserialize_with = "null_as_default")]
    pub redirects: Vec<RedirectHop>,
    /// Raw payload or classified failure string
    #[serde(default)]
    pub config: String,
    /// Certificate facts when the answer came over TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_info: Option<CertInfo>,
    /// Attempt-level error
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

impl QueryAttempt {
    /// Starts a record for `uri` with no outcome yet.
    pub fn new(domain: &str, method: &str, index: u32, uri: &str) -> Self {
        Self {
            domain: domain.to_string(),
            method: method.to_string(),
            index,
            uri: uri.to_string(),
            ..Default::default()
        }
    }

    /// Builds a record that failed before any request was made.
    pub fn failed(domain: &str, method: &str, index: u32, uri: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(domain, method, index, uri)
        }
    }
}

/// Result of one Autodiscover strategy attempt.
pub type AutodiscoverResult = QueryAttempt;
/// Result of one Autoconfig candidate URL.
pub type AutoconfigResult = QueryAttempt;

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SrvRecord {
    /// Full queried name, e.g. `_imaps._tcp.example.com`
    pub service: String,
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    /// Target host, trailing dot kept
    pub target: String,
}

/// Zone authority plus the DNSSEC AD bit of every answered SRV service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub domain: String,
    #[serde(rename = "SOA", default, skip_serializing_if = "Option::is_none")]
    pub soa: Option<String>,
    #[serde(rename = "NS", default, skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    #[serde(rename = "ADbit_imap", default, skip_serializing_if = "Option::is_none")]
    pub adbit_imap: Option<bool>,
    #[serde(rename = "ADbit_imaps", default, skip_serializing_if = "Option::is_none")]
    pub adbit_imaps: Option<bool>,
    #[serde(rename = "ADbit_pop3", default, skip_serializing_if = "Option::is_none")]
    pub adbit_pop3: Option<bool>,
    #[serde(rename = "ADbit_pop3s", default, skip_serializing_if = "Option::is_none")]
    pub adbit_pop3s: Option<bool>,
    #[serde(rename = "ADbit_smtp", default, skip_serializing_if = "Option::is_none")]
    pub adbit_smtp: Option<bool>,
    #[serde(rename = "ADbit_smtps", default, skip_serializing_if = "Option::is_none")]
    pub adbit_smtps: Option<bool>,
}

/// SRV discovery outcome for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvResult {
    pub domain: String,
    /// IMAP/POP3 records in selection order
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub recv_records: Vec<SrvRecord>,
    /// Submission records in selection order
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub send_records: Vec<SrvRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_record: Option<DnsRecord>,
}

impl SrvResult {
    /// True when at least one usable record was found.
    pub fn has_records(&self) -> bool {
        !self.recv_records.is_empty() || !self.send_records.is_empty()
    }
}

/// Aggregate scan record for one domain, one JSON line per domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    /// Position of the domain in the input
    pub id: u64,
    pub domain: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub cname: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub autodiscover: Vec<AutodiscoverResult>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub autoconfig: Vec<AutoconfigResult>,
    #[serde(default)]
    pub srv: SrvResult,
    /// Reachable `host:port` strings, sorted
    #[serde(default, deserialize_with = "null_as_default")]
    pub guess: Vec<String>,
    /// RFC 3339 completion time
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
}

/// Normalized protocol configuration shared by all mechanisms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProtocolInfo {
    #[serde(rename = "Type")]
    pub protocol_type: String,
    pub server: String,
    pub port: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub domain_required: String,
    #[serde(rename = "SPA", skip_serializing_if = "String::is_empty")]
    pub spa: String,
    #[serde(rename = "SSL", skip_serializing_if = "String::is_empty")]
    pub ssl: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_required: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub encryption: String,
    #[serde(rename = "UsePOPAuth", skip_serializing_if = "String::is_empty")]
    pub use_pop_auth: String,
    #[serde(rename = "SMTPLast", skip_serializing_if = "String::is_empty")]
    pub smtp_last: String,
    #[serde(rename = "TTL", skip_serializing_if = "String::is_empty")]
    pub ttl: String,
    /// `"Valid"` or the reason the entry is invalid
    pub single_check: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub priority: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub weight: String,
}

/// Protocols produced by one mechanism path plus its aggregate verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MethodConfig {
    pub method: String,
    #[serde(deserialize_with = "null_as_default")]
    pub protocols: Vec<ProtocolInfo>,
    pub overall_check: String,
}

/// Normalization and consistency verdicts for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DomainCheckResult {
    pub domain: String,
    #[serde(
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub autodiscover_check_result: Vec<MethodConfig>,
    #[serde(
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub autoconfig_check_result: Vec<MethodConfig>,
    #[serde(rename = "SRVCheckResult", skip_serializing_if = "Option::is_none")]
    pub srv_check_result: Option<MethodConfig>,
    #[serde(skip_serializing_if = "is_false")]
    pub autodiscover_inconsistent: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub autoconfig_inconsistent: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub inconsistent: bool,
}

/// One protocol/port pair advertised by a mechanism.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortUsageDetail {
    /// SMTP / IMAP / POP3
    pub protocol: String,
    pub port: String,
    /// `standard`/`nonstandard`, or `secure`/`insecure` for SRV
    pub status: String,
    pub host: String,
    pub ssl: String,
}

/// Port usage of one valid Autodiscover or Autoconfig path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathPortUsage {
    pub index: u32,
    pub uri: String,
    pub method: String,
    pub config: String,
    #[serde(default)]
    pub ports_usage: Vec<PortUsageDetail>,
    #[serde(default)]
    pub redirects: Vec<RedirectHop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_info: Option<CertInfo>,
}

/// SRV records split by direction, as embedded in diff output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvRecordSets {
    #[serde(default)]
    pub recv: Vec<SrvRecord>,
    #[serde(default)]
    pub send: Vec<SrvRecord>,
}

/// Port usage derived from a domain's SRV answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvPortUsage {
    pub srv_records: SrvRecordSets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_record: Option<DnsRecord>,
    #[serde(default)]
    pub ports_usage: Vec<PortUsageDetail>,
}

/// Port-usage diff verdicts for one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainCheckDifResult {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autodiscover_check_result: Vec<PathPortUsage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autoconfig_check_result: Vec<PathPortUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srv_check_result: Option<SrvPortUsage>,
    pub autodiscover_inconsistent: bool,
    pub autoconfig_inconsistent: bool,
    pub mechanism_diff: bool,
    pub inconsistent: bool,
}

/// Handshake details reported by the external probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub error: Vec<String>,
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cipher: Vec<serde_json::Value>,
    #[serde(rename = "tls ca")]
    pub tls_ca: String,
}

/// Structured record emitted by the external probe on stdout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub success: bool,
    #[serde(default)]
    pub info: Option<TlsInfo>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Probe results of one host:port in all three modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectDetail {
    /// imap / smtp / pop3
    #[serde(rename = "type")]
    pub protocol_type: String,
    pub host: String,
    pub port: String,
    pub plain: ConnectInfo,
    pub starttls: ConnectInfo,
    pub tls: ConnectInfo,
}
