//! Error type definitions.
//!
//! Typed errors for the fallible building blocks, plus the `ErrorType`
//! taxonomy used to count per-attempt failures during a scan.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error building a TLS configuration.
    #[error("TLS configuration error: {0}")]
    TlsConfigError(#[from] rustls::Error),

    /// The resolver address could not be parsed.
    #[error("Invalid resolver address {0}")]
    ResolverAddressError(String),
}

/// Error types for DNS queries.
#[derive(Error, Debug)]
pub enum DnsError {
    /// No answer before the deadline.
    #[error("DNS query timed out after {0}s")]
    Timeout(u64),

    /// Transport failure, or a message that could not be encoded or decoded.
    #[error("DNS query failed: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),

    /// The resolver answered with a non-success response code.
    #[error("DNS query failed with Rcode {0}")]
    Rcode(u16),

    /// The answer section held no usable record.
    #[error("{0}")]
    NoRecords(String),
}

impl DnsError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DnsError::Timeout(_) => true,
            DnsError::Proto(e) => matches!(
                e.kind(),
                hickory_proto::error::ProtoErrorKind::Io(_)
                    | hickory_proto::error::ProtoErrorKind::Timeout
            ),
            _ => false,
        }
    }
}

/// Error types for XML document parsing.
#[derive(Error, Debug)]
pub enum XmlError {
    /// Tokenizer failure.
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    /// Attribute could not be decoded.
    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// The document had no root element.
    #[error("EOF")]
    Empty,

    /// Input ended inside an element.
    #[error("unexpected EOF inside <{0}>")]
    Unclosed(String),
}

/// Error types for result persistence.
#[derive(Error, Debug)]
pub enum StorageError {
    /// File I/O failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Delimited input could not be opened or read.
    #[error("Input error: {0}")]
    Csv(#[from] csv::Error),

    /// The writer task is gone.
    #[error("Batch writer closed")]
    WriterClosed,
}

/// Error types for the external handshake probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe process could not be spawned or awaited.
    #[error("execution error: {0}")]
    Spawn(#[from] std::io::Error),

    /// The probe exited unsuccessfully.
    #[error("execution error: {status}, output: {output}")]
    Exit {
        /// Exit status description
        status: String,
        /// Combined output of the probe
        output: String,
    },

    /// The probe did not finish in time.
    #[error("execution error: probe timed out after {0}s")]
    Timeout(u64),

    /// Standard output was not a `ConnectInfo` document.
    #[error("invalid JSON output: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    /// The probe ran but reported a failed handshake.
    #[error("TLS test failed: {0}")]
    Failed(String),
}

/// Categories of per-attempt failures recorded during a scan.
///
/// Failures never abort a domain; they are recorded on the attempt record and
/// counted here so a run can summarize where discovery broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    // HTTP/Network errors
    HttpTransportError,
    HttpTimeoutError,
    HttpBadStatus,
    HttpMissingLocation,
    HttpTooManyRedirects,
    // Autodiscover protocol errors
    XmlDecodeError,
    RedirectAddrLoop,
    RedirectUrlLoop,
    EmptyRedirectTarget,
    GetPostNoRedirect,
    // DNS errors
    DnsSrvLookupError,
    DnsMxLookupError,
    DnsCnameLookupError,
    MxDomainExtractError,
    // TLS errors
    CertificateCaptureError,
    // Anything else
    OtherError,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    /// Human-readable label used in run summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::HttpTransportError => "HTTP transport error",
            ErrorType::HttpTimeoutError => "HTTP timeout",
            ErrorType::HttpBadStatus => "HTTP unexpected status code",
            ErrorType::HttpMissingLocation => "HTTP redirect without Location",
            ErrorType::HttpTooManyRedirects => "HTTP too many redirects",
            ErrorType::XmlDecodeError => "XML decode error",
            ErrorType::RedirectAddrLoop => "Too many redirectAddr answers",
            ErrorType::RedirectUrlLoop => "Too many redirectUrl answers",
            ErrorType::EmptyRedirectTarget => "Empty redirect target",
            ErrorType::GetPostNoRedirect => "GET probe without redirect",
            ErrorType::DnsSrvLookupError => "DNS SRV lookup error",
            ErrorType::DnsMxLookupError => "DNS MX lookup error",
            ErrorType::DnsCnameLookupError => "DNS CNAME lookup error",
            ErrorType::MxDomainExtractError => "MX domain extraction error",
            ErrorType::CertificateCaptureError => "Certificate capture error",
            ErrorType::OtherError => "Other error",
        }
    }
}
