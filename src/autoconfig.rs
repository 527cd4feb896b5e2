//! Autoconfig discovery.
//!
//! Probes the direct and well-known Autoconfig URLs, the ISPDB entry for the
//! domain and the URLs derived from the domain's most preferred MX host. Each
//! URL is fetched once with GET; transport redirects are followed and every
//! hop is recorded.

use std::sync::Arc;

use reqwest::header::LOCATION;

use crate::config::{ISPDB_BASE_URL, MAX_REDIRECT_HOPS, PROBE_MAILBOX};
use crate::dns::{extract_mx_domains, DnsClient};
use crate::models::{AutoconfigResult, QueryAttempt, RedirectHop};
use crate::tls::CertificateValidator;
use crate::xml::Element;

/// Fetches Autoconfig documents for a domain.
#[derive(Debug, Clone)]
pub struct AutoconfigResolver {
    client: Arc<reqwest::Client>,
    dns: Arc<DnsClient>,
    validator: Arc<CertificateValidator>,
}

/// Direct and well-known URLs: https first, then http.
pub fn direct_urls(domain: &str, email: &str) -> [String; 4] {
    [
        format!("https://autoconfig.{domain}/mail/config-v1.1.xml?emailaddress={email}"),
        format!("https://{domain}/.well-known/autoconfig/mail/config-v1.1.xml?emailaddress={email}"),
        format!("http://autoconfig.{domain}/mail/config-v1.1.xml?emailaddress={email}"),
        format!("http://{domain}/.well-known/autoconfig/mail/config-v1.1.xml?emailaddress={email}"),
    ]
}

/// ISPDB entry for `domain`.
pub fn ispdb_url(domain: &str) -> String {
    format!("{ISPDB_BASE_URL}{domain}")
}

/// URLs derived from an MX host's `full` and registrable `main` domains.
///
/// Returns the method label and `(index, url)` pairs. When both domains are
/// equal only the two distinct URLs are kept, at indices 1 and 3.
pub fn mx_candidates(full: &str, main: &str, email: &str) -> (&'static str, Vec<(u32, String)>) {
    let autoconfig = |d: &str| format!("https://autoconfig.{d}/mail/config-v1.1.xml?emailaddress={email}");
    if full == main {
        (
            "MX_samedomain",
            vec![(1, autoconfig(full)), (3, ispdb_url(full))],
        )
    } else {
        (
            "MX",
            vec![
                (1, autoconfig(full)),
                (2, autoconfig(main)),
                (3, ispdb_url(full)),
                (4, ispdb_url(main)),
            ],
        )
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

impl AutoconfigResolver {
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

    /// Probes every candidate URL for `domain` with the address `info@<domain>`.
    pub async fn query_all(&self, domain: &str) -> Vec<AutoconfigResult> {
        let email = format!("{PROBE_MAILBOX}@{domain}");
        let mut results = Vec::new();

        for (i, url) in direct_urls(domain, &email).iter().enumerate() {
            results.push(self.fetch(domain, "directurl", i as u32 + 1, url).await);
        }

        results.push(self.fetch(domain, "ISPDB", 0, &ispdb_url(domain)).await);

        match self.mx_targets(domain, &email).await {
            Ok((method, urls)) => {
                for (index, url) in urls {
                    results.push(self.fetch(domain, method, index, &url).await);
                }
            }
            Err(failure) => results.push(*failure),
        }

        results
    }

    /// Resolves the MX-derived candidate URLs, or the failure record to store instead.
    pub async fn mx_targets(
        &self,
        domain: &str,
        email: &str,
    ) -> Result<(&'static str, Vec<(u32, String)>), Box<AutoconfigResult>> {
        let mx_host = self.dns.resolve_mx(domain).await.map_err(|e| {
            Box::new(QueryAttempt::failed(
                domain,
                "MX",
                0,
                "",
                format!("Resolve MX Record error for {domain}: {e}"),
            ))
        })?;
        let (full, main) = extract_mx_domains(&mx_host).map_err(|e| {
            Box::new(QueryAttempt::failed(
                domain,
                "MX",
                0,
                "",
                format!("extract domain from mxHost error for {domain}: {e}"),
            ))
        })?;
        log::debug!("MX host {mx_host} of {domain}: full={full}, main={main}");
        Ok(mx_candidates(&full, &main, email))
    }

    /// Fetches one candidate URL, following transport redirects.
    ///
    /// The HTTP status of the final answer is not consulted: any body whose
    /// root element is `<clientConfig>` is kept as the payload.
    pub async fn fetch(&self, domain: &str, method: &str, index: u32, url: &str) -> AutoconfigResult {
        let mut result = QueryAttempt::new(domain, method, index, url);
        let mut current = url.to_string();
        let mut followed = 0usize;

        let response = loop {
            let response = match self.client.get(&current).send().await {
                Ok(response) => response,
                Err(e) => {
                    result.error = Some(format!("failed to send request: {e}"));
                    return result;
                }
            };
            let status = response.status().as_u16();
            result.redirects.push(RedirectHop {
                url: current.clone(),
                status,
            });

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty());
            let Some(location) = location.filter(|_| is_redirect(status)) else {
                break response;
            };
            if followed >= MAX_REDIRECT_HOPS {
                result.error = Some(format!("stopped after {MAX_REDIRECT_HOPS} redirects"));
                return result;
            }
            match url::Url::parse(&current).and_then(|base| base.join(location)) {
                Ok(next) => current = next.to_string(),
                Err(_) => {
                    result.error = Some(format!("failed to parse redirect URL: {location}"));
                    return result;
                }
            }
            followed += 1;
        };

        let body = match response.bytes().await {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(e) => {
                result.error = Some(format!("failed to read response body: {e}"));
                return result;
            }
        };

        match Element::parse(&body) {
            Ok(root) if root.name == "clientConfig" => {
                result.cert_info = self.validator.capture_url(&current).await;
                result.config = body;
            }
            Ok(root) => {
                result.error = Some(format!(
                    "failed to unmarshal XML: expected element type <clientConfig> but have <{}>",
                    root.name
                ));
            }
            Err(e) => result.error = Some(format!("failed to unmarshal XML: {e}")),
        }
        result
    }
}
