//! Per-domain discovery pipeline.
//!
//! For one domain the mechanisms run one after another: CNAME, Autodiscover,
//! Autoconfig, SRV, then the guess pass. Every failure stays inside the
//! attempt that produced it, so a scanned domain always yields a
//! `DomainResult`.

use std::sync::Arc;

use chrono::Utc;

use crate::autoconfig::AutoconfigResolver;
use crate::autodiscover::AutodiscoverResolver;
use crate::config::{Config, GUESS_CONNECT_TIMEOUT};
use crate::dns::DnsClient;
use crate::error_handling::InitializationError;
use crate::guess::GuessResolver;
use crate::initialization::{init_client, init_resolver};
use crate::models::DomainResult;
use crate::srv::SrvResolver;
use crate::tls::{CertificateValidator, TrustAnchors};

/// Shared resources for processing domains.
///
/// Built once per run and shared by every domain task through an `Arc`.
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// DNS client for CNAME lookups
    pub dns: Arc<DnsClient>,
    /// Autodiscover strategies
    pub autodiscover: AutodiscoverResolver,
    /// Autoconfig candidate URLs
    pub autoconfig: AutoconfigResolver,
    /// SRV and authority lookups
    pub srv: SrvResolver,
    /// TCP reachability guessing
    pub guess: GuessResolver,
}

impl ScanContext {
    /// Builds every resolver from `config`.
    ///
    /// A missing or unreadable root bundle is not an error here: the validator
    /// then reports every chain as untrusted.
    pub fn new(config: &Config) -> Result<Self, InitializationError> {
        let client = init_client(config)?;
        let dns = Arc::new(DnsClient::new(init_resolver(config)?));
        let anchors = Arc::new(TrustAnchors::from_pem_file(config.roots_pem.as_deref()));
        if !anchors.is_available() {
            log::warn!("No usable root certificates; every trust verdict will be negative");
        }
        let validator = Arc::new(CertificateValidator::new(anchors, Arc::clone(&client)));
        let guess = GuessResolver::new(GUESS_CONNECT_TIMEOUT, config.guess_concurrency);
        Ok(Self::from_parts(client, dns, validator, guess))
    }

    /// Assembles a context from already built parts.
    pub fn from_parts(
        client: Arc<reqwest::Client>,
        dns: Arc<DnsClient>,
        validator: Arc<CertificateValidator>,
        guess: GuessResolver,
    ) -> Self {
        Self {
            autodiscover: AutodiscoverResolver::new(
                Arc::clone(&client),
                Arc::clone(&dns),
                Arc::clone(&validator),
            ),
            autoconfig: AutoconfigResolver::new(client, Arc::clone(&dns), validator),
            srv: SrvResolver::new(Arc::clone(&dns)),
            dns,
            guess,
        }
    }
}

/// CNAME targets of `domain`; a failed lookup is pushed onto `errors`.
async fn resolve_cname(dns: &DnsClient, domain: &str, errors: &mut Vec<String>) -> Vec<String> {
    match dns.lookup_cname(domain).await {
        Ok(cname) => cname,
        Err(e) => {
            log::debug!("CNAME lookup for {domain} failed: {e}");
            errors.push(format!("CNAME lookup error: {e}"));
            Vec::new()
        }
    }
}

/// Runs the full discovery pipeline for one domain.
pub async fn process_domain(ctx: &ScanContext, id: u64, domain: &str) -> DomainResult {
    log::debug!("Processing domain {domain}");
    let mut errors = Vec::new();

    let cname = resolve_cname(&ctx.dns, domain, &mut errors).await;
    let autodiscover = ctx.autodiscover.query_all(domain).await;
    let autoconfig = ctx.autoconfig.query_all(domain).await;
    let srv = ctx.srv.query(domain).await;
    let guess = ctx.guess.guess(domain).await;

    DomainResult {
        id,
        domain: domain.to_string(),
        cname,
        autodiscover,
        autoconfig,
        srv,
        guess,
        timestamp: Utc::now().to_rfc3339(),
        errors,
    }
}
