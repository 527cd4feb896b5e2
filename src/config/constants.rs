//! Configuration constants.
//!
//! Timeouts, loop bounds and pool sizes used throughout the resolver pipeline.
//! Values mirror the behavior mail clients exhibit when they probe these endpoints.

use std::time::Duration;

// Concurrency
/// Maximum number of domains processed concurrently (semaphore limit)
pub const DOMAIN_CONCURRENCY: usize = 200;
/// Maximum number of concurrent TCP probes inside one guess pass
pub const GUESS_CONCURRENCY: usize = 20;
/// Number of finished records buffered before they are appended to the output file
pub const BATCH_SIZE: usize = 500;
/// Progress is logged every N completed domains
pub const LOGGING_INTERVAL: usize = 100;

// DNS
/// Recursive resolver used for every DNS query
pub const DEFAULT_RESOLVER: &str = "8.8.8.8:53";
/// Timeout for SRV, SOA/NS and MX queries in seconds
pub const DNS_TIMEOUT_SECS: u64 = 15;
/// Timeout for CNAME and `_autodiscover._tcp` SRV queries in seconds
pub const DNS_SHORT_TIMEOUT_SECS: u64 = 5;
/// EDNS(0) UDP payload size advertised with DNSSEC-OK queries
pub const EDNS_PAYLOAD_SIZE: u16 = 4096;
/// Total CNAME lookup attempts (initial + retries)
pub const CNAME_ATTEMPTS: usize = 3;

// Network operation timeouts
/// HTTP request timeout in seconds (Autodiscover and Autoconfig)
pub const HTTP_TIMEOUT_SECS: u64 = 15;
/// TCP connection timeout in seconds for certificate capture
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 15;
/// TLS handshake timeout in seconds for certificate capture
pub const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 15;
/// Connect timeout for a single guessed host:port
pub const GUESS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Executable invoked for raw handshake probes
pub const DEFAULT_PROBE_PROGRAM: &str = "tls-probe";
/// Upper bound on one external probe invocation
pub const PROBE_TIMEOUT_SECS: u64 = 60;

/// User-Agent sent with every Autodiscover and Autoconfig request
pub const DEFAULT_USER_AGENT: &str = concat!("mailconf_scan/", env!("CARGO_PKG_VERSION"));

// Redirect handling
/// Maximum HTTP 301/302 redirects followed by one Autodiscover attempt
pub const MAX_REDIRECTS: u32 = 10;
/// Maximum `redirectAddr` answers followed by one Autodiscover attempt
pub const MAX_REDIRECT_ADDR: u32 = 10;
/// Maximum `redirectUrl` answers followed by one Autodiscover attempt
pub const MAX_REDIRECT_URL: u32 = 10;
/// Maximum transport redirects followed for one Autoconfig URL
pub const MAX_REDIRECT_HOPS: usize = 10;

// Certificates
/// Maximum number of issuer certificates fetched through AIA for a bare leaf
pub const MAX_AIA_FETCH_DEPTH: usize = 5;

// Well-known endpoints
/// Thunderbird ISPDB base URL
pub const ISPDB_BASE_URL: &str = "https://autoconfig.thunderbird.net/v1.1/";
/// Autodiscover request schema namespace
pub const AUTODISCOVER_REQUEST_SCHEMA: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/outlook/requestschema/2006";
/// Namespace of the `<Autodiscover>` response root element
pub const AUTODISCOVER_RESPONSE_ROOT_NS: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006";
/// Namespace of the Outlook `<Response>` element
pub const AUTODISCOVER_OUTLOOK_RESPONSE_NS: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a";
/// Local part of the address used for every probe
pub const PROBE_MAILBOX: &str = "info";
