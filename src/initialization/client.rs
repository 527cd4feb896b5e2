//! HTTP client initialization.
//!
//! One client is shared by the Autodiscover and Autoconfig resolvers. It never
//! follows redirects on its own, because both resolvers record every hop, and
//! it accepts invalid certificates so untrusted servers are still measured.
//! Trust is judged separately from the captured chain.

use std::sync::Arc;
use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::{Config, DEFAULT_USER_AGENT};
use crate::error_handling::InitializationError;

/// Initializes the shared discovery HTTP client.
///
/// Creates a `reqwest::Client` configured with:
/// - Timeout from the configuration
/// - Redirect following disabled (hops are walked and recorded manually)
/// - Invalid certificates accepted
/// - Rustls TLS backend (no native TLS)
///
/// # Errors
///
/// Returns `InitializationError::HttpClientError` if client creation fails.
pub fn init_client(config: &Config) -> Result<Arc<reqwest::Client>, InitializationError> {
    let client = ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(DEFAULT_USER_AGENT)
        .build()?;
    Ok(Arc::new(client))
}
