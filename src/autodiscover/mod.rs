//! Autodiscover discovery.
//!
//! Four independent entry strategies are tried for every domain, each producing
//! its own result records:
//! - `POST` to the four well-known URIs
//! - `srv-post`: POST to the endpoint named by `_autodiscover._tcp`
//! - `get-post`: GET the autodiscover subdomain, then POST where it redirects
//! - `direct_get`: the four well-known URIs driven by GET only
//!
//! Redirect and loop bounds are enforced per attempt by the state machine in
//! `state`; no counter is shared between attempts.

mod response;
mod state;

use std::sync::Arc;

use reqwest::header::LOCATION;

use crate::config::PROBE_MAILBOX;
use crate::dns::DnsClient;
use crate::models::{AutodiscoverResult, QueryAttempt, RedirectHop};
use crate::tls::CertificateValidator;

pub use state::{AttemptOutcome, QueryMode};

/// Runs the Autodiscover strategies for a domain.
#[derive(Debug, Clone)]
pub struct AutodiscoverResolver {
    client: Arc<reqwest::Client>,
    dns: Arc<DnsClient>,
    validator: Arc<CertificateValidator>,
}

/// The four well-known Autodiscover URIs, in probing order.
pub fn well_known_uris(domain: &str) -> [String; 4] {
    [
        format!("http://{domain}/autodiscover/autodiscover.xml"),
        format!("https://autodiscover.{domain}/autodiscover/autodiscover.xml"),
        format!("http://autodiscover.{domain}/autodiscover/autodiscover.xml"),
        format!("https://{domain}/autodiscover/autodiscover.xml"),
    ]
}

fn into_result(
    domain: &str,
    method: &str,
    index: u32,
    uri: &str,
    outcome: AttemptOutcome,
) -> AutodiscoverResult {
    QueryAttempt {
        redirects: outcome.redirects,
        config: outcome.config,
        cert_info: outcome.cert_info,
        error: outcome.error,
        ..QueryAttempt::new(domain, method, index, uri)
    }
}

impl AutodiscoverResolver {
    /// Creates a resolver. `client` must not follow redirects on its own.
    pub fn new(
        client: Arc<reqwest::Client>,
        dns: Arc<DnsClient>,
        validator: Arc<CertificateValidator>,
    ) -> Self {
        Self {
            client,
            dns,
            validator,
        }
    }

    /// Runs every strategy for `domain` with the address `info@<domain>`.
    ///
    /// Always returns ten records: four `POST`, one `srv-post`, one `get-post`
    /// and four `direct_get`.
    pub async fn query_all(&self, domain: &str) -> Vec<AutodiscoverResult> {
        let email = format!("{PROBE_MAILBOX}@{domain}");
        let uris = well_known_uris(domain);
        let mut results = Vec::with_capacity(10);

        for (i, uri) in uris.iter().enumerate() {
            let outcome = self.run_attempt(uri, &email, QueryMode::Post).await;
            results.push(into_result(domain, "POST", i as u32 + 1, uri, outcome));
        }

        results.push(self.query_srv_post(domain, &email).await);

        let get_uri = format!("http://autodiscover.{domain}/autodiscover/autodiscover.xml");
        results.push(self.query_get_post(domain, &get_uri, &email).await);

        for (i, uri) in uris.iter().enumerate() {
            let outcome = self.run_attempt(uri, &email, QueryMode::Get).await;
            results.push(into_result(domain, "direct_get", i as u32 + 1, uri, outcome));
        }

        log::debug!(
            "Autodiscover for {domain}: {} of {} attempts returned a payload",
            results.iter().filter(|r| !r.config.is_empty()).count(),
            results.len()
        );
        results
    }

    /// POSTs to the endpoint advertised by the domain's `_autodiscover._tcp` SRV record.
    pub async fn query_srv_post(&self, domain: &str, email: &str) -> AutodiscoverResult {
        let service = format!("_autodiscover._tcp.{domain}");
        match self.dns.lookup_autodiscover_srv(domain).await {
            Ok((uri, authentic_data)) => {
                log::debug!("{service} points to {uri} (AD={authentic_data})");
                let outcome = self.run_attempt(&uri, email, QueryMode::Post).await;
                into_result(domain, "srv-post", 0, &uri, outcome)
            }
            Err(e) => QueryAttempt::failed(
                domain,
                "srv-post",
                0,
                "",
                format!("Failed to lookup SRV records for {service}: {e}"),
            ),
        }
    }

    /// GETs `get_uri` and, only if it redirects, POSTs to the redirect target.
    pub async fn query_get_post(&self, domain: &str, get_uri: &str, email: &str) -> AutodiscoverResult {
        let failed = |error: String| QueryAttempt::failed(domain, "get-post", 0, get_uri, error);

        let response = match self.client.get(get_uri).send().await {
            Ok(response) => response,
            Err(e) => return failed(format!("failed to send request: {e}")),
        };
        let status = response.status().as_u16();
        if status != 301 && status != 302 {
            return failed("not find Redirect Statuscode".to_string());
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if location.is_empty() {
            return failed("missing Location header in redirect".to_string());
        }
        let target = match state::resolve_location(get_uri, location) {
            Ok(target) => target,
            Err(e) => return failed(e),
        };

        let mut outcome = self.run_attempt(&target, email, QueryMode::Post).await;
        outcome.redirects.insert(
            0,
            RedirectHop {
                url: get_uri.to_string(),
                status,
            },
        );
        into_result(domain, "get-post", 0, get_uri, outcome)
    }
}

#[cfg(test)]
mod tests;
