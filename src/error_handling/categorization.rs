//! Error categorization and retry strategy.

use std::time::Duration;

use super::stats::ProcessingStats;
use super::types::ErrorType;
use crate::models::DomainResult;

/// Creates the retry strategy used for CNAME lookups.
///
/// Delays grow linearly (1s, 2s, ...) and the iterator is limited so the
/// initial attempt plus retries never exceed `CNAME_ATTEMPTS`.
///
/// # Returns
///
/// A retry strategy iterator ready for use with `tokio_retry::RetryIf`.
pub fn get_retry_strategy() -> impl Iterator<Item = Duration> {
    (1..crate::config::CNAME_ATTEMPTS as u64).map(Duration::from_secs)
}

/// Maps a recorded per-attempt error string onto an `ErrorType`.
///
/// The strings are the ones written by the resolvers, so matching on their
/// stable prefixes is enough.
pub fn categorize_attempt_error(message: &str) -> ErrorType {
    let lower = message.to_ascii_lowercase();
    if message.starts_with("unexpected status code") {
        ErrorType::HttpBadStatus
    } else if message.starts_with("missing Location header") {
        ErrorType::HttpMissingLocation
    } else if message.starts_with("too many redirect times") || message.starts_with("stopped after")
    {
        ErrorType::HttpTooManyRedirects
    } else if message.starts_with("too many RedirectAddr") {
        ErrorType::RedirectAddrLoop
    } else if message.starts_with("too many RedirectUrl") {
        ErrorType::RedirectUrlLoop
    } else if message.starts_with("nil Re") {
        ErrorType::EmptyRedirectTarget
    } else if message.starts_with("failed to unmarshal XML") {
        ErrorType::XmlDecodeError
    } else if message.starts_with("not find Redirect Statuscode") {
        ErrorType::GetPostNoRedirect
    } else if message.starts_with("Failed to lookup SRV records") {
        ErrorType::DnsSrvLookupError
    } else if message.starts_with("Resolve MX Record error") {
        ErrorType::DnsMxLookupError
    } else if message.starts_with("extract domain from mxHost error") {
        ErrorType::MxDomainExtractError
    } else if message.starts_with("CNAME lookup error") {
        ErrorType::DnsCnameLookupError
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ErrorType::HttpTimeoutError
    } else if message.starts_with("failed to send request")
        || message.starts_with("failed to read response body")
    {
        ErrorType::HttpTransportError
    } else {
        ErrorType::OtherError
    }
}

/// Counts every error recorded on a finished domain result.
pub fn update_error_stats(stats: &ProcessingStats, result: &DomainResult) {
    let attempt_errors = result
        .autodiscover
        .iter()
        .filter_map(|a| a.error.as_deref())
        .chain(result.autoconfig.iter().filter_map(|a| a.error.as_deref()));
    for message in attempt_errors.chain(result.errors.iter().map(String::as_str)) {
        stats.increment_error(categorize_attempt_error(message));
    }
}
