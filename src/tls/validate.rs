//! Chain inspection and trust verdicts.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rustls::pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::capture::capture_peer_chain;
use super::extract::{
    alg_warning, ca_issuer_urls, chain_order, common_name, is_expired, is_self_signed,
    matches_hostname, signature_algorithm_name,
};
use super::roots::TrustAnchors;
use crate::config::MAX_AIA_FETCH_DEPTH;
use crate::models::CertInfo;

/// Produces `CertInfo` verdicts for presented certificate chains.
///
/// Shared by every resolver that terminates a query over TLS.
#[derive(Debug, Clone)]
pub struct CertificateValidator {
    anchors: Arc<TrustAnchors>,
    client: Arc<reqwest::Client>,
}

impl CertificateValidator {
    /// Creates a validator over `anchors`; `client` is used for AIA issuer fetches.
    pub fn new(anchors: Arc<TrustAnchors>, client: Arc<reqwest::Client>) -> Self {
        Self { anchors, client }
    }

    /// Performs a handshake with `host:port` and inspects the presented chain.
    ///
    /// # Errors
    ///
    /// Returns the capture failure text when no chain could be obtained.
    pub async fn capture(&self, host: &str, port: u16) -> Result<CertInfo, String> {
        let peer = capture_peer_chain(host, port).await?;
        Ok(self
            .inspect(&peer.certificates, peer.tls_version, host)
            .await)
    }

    /// Captures certificate facts for the endpoint an HTTPS answer came from.
    ///
    /// Returns `None` for non-HTTPS URLs and for failed captures; failures are
    /// logged at debug level.
    pub async fn capture_url(&self, url: &str) -> Option<CertInfo> {
        let parsed = url::Url::parse(url).ok()?;
        if parsed.scheme() != "https" {
            return None;
        }
        let host = parsed.host_str()?.trim_start_matches('[').trim_end_matches(']');
        let port = parsed.port_or_known_default()?;
        match self.capture(host, port).await {
            Ok(info) => Some(info),
            Err(e) => {
                log::debug!("Certificate capture for {url} failed: {e}");
                None
            }
        }
    }

    /// Derives every `CertInfo` fact from `chain` (leaf first) for `hostname`.
    ///
    /// Never fails: an unparsable leaf yields an untrusted verdict carrying the
    /// parse error.
    pub async fn inspect(
        &self,
        chain: &[CertificateDer<'static>],
        tls_version: u16,
        hostname: &str,
    ) -> CertInfo {
        let mut info = CertInfo {
            tls_version,
            raw_certs: chain.iter().map(|c| BASE64.encode(c.as_ref())).collect(),
            ..Default::default()
        };

        let parsed: Vec<X509Certificate<'_>> = chain
            .iter()
            .filter_map(|der| X509Certificate::from_der(der.as_ref()).ok().map(|(_, c)| c))
            .collect();
        let Some(leaf) = chain
            .first()
            .and_then(|der| X509Certificate::from_der(der.as_ref()).ok())
            .map(|(_, c)| c)
        else {
            info.verify_error = "certificate verify failed: unable to parse leaf certificate".into();
            info.is_in_order = "single".into();
            return info;
        };

        match self.verify_chain(chain, &leaf, hostname).await {
            Ok(()) => info.is_trusted = true,
            Err(e) => info.verify_error = e,
        }

        info.is_hostname_match = matches_hostname(&leaf, hostname);
        info.is_in_order = chain_order(&parsed).to_string();
        info.is_expired = is_expired(&leaf);
        info.is_self_signed = is_self_signed(&leaf);
        info.signature_alg = signature_algorithm_name(&leaf);
        info.alg_warning = alg_warning(&leaf);
        info.subject = common_name(leaf.subject());
        info.issuer = common_name(leaf.issuer());
        info
    }

    async fn verify_chain(
        &self,
        chain: &[CertificateDer<'static>],
        leaf: &X509Certificate<'_>,
        hostname: &str,
    ) -> Result<(), String> {
        if !self.anchors.is_available() {
            // Surfaces the stored load error
            return self.anchors.verify(chain, hostname);
        }

        if chain.len() == 1 && !is_self_signed(leaf) {
            let mut completed = chain.to_vec();
            let issuers = self
                .fetch_issuers(leaf)
                .await
                .map_err(|e| format!("failed to fetch certificate chain: {e}"))?;
            completed.extend(issuers);
            return self.anchors.verify(&completed, hostname);
        }

        self.anchors.verify(chain, hostname)
    }

    /// Walks the `caIssuers` URLs upwards from `leaf`.
    ///
    /// Stops at a self-signed certificate, a certificate without issuer URLs,
    /// or after `MAX_AIA_FETCH_DEPTH` fetches.
    async fn fetch_issuers(
        &self,
        leaf: &X509Certificate<'_>,
    ) -> Result<Vec<CertificateDer<'static>>, String> {
        let mut fetched: Vec<CertificateDer<'static>> = Vec::new();
        let mut urls = ca_issuer_urls(leaf);

        for _ in 0..MAX_AIA_FETCH_DEPTH {
            let Some(url) = urls.first().cloned() else {
                break;
            };
            let cert = self.fetch_issuer(&url).await?;
            let (_, parsed) = X509Certificate::from_der(cert.as_ref())
                .map_err(|e| format!("unable to parse issuer certificate from {url}: {e}"))?;
            let done = is_self_signed(&parsed);
            urls = ca_issuer_urls(&parsed);
            fetched.push(cert);
            if done {
                break;
            }
        }

        if fetched.is_empty() {
            log::debug!("Bare leaf without issuer URLs; verifying as presented");
        }
        Ok(fetched)
    }

    async fn fetch_issuer(&self, url: &str) -> Result<CertificateDer<'static>, String> {
        log::debug!("Fetching issuer certificate from {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("{url}: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("{url}: unexpected status code: {}", response.status().as_u16()));
        }
        let body = response.bytes().await.map_err(|e| format!("{url}: {e}"))?;
        decode_certificate(&body).ok_or_else(|| format!("{url}: no certificate in response"))
    }
}

/// Reads one certificate from a DER or PEM body.
fn decode_certificate(body: &[u8]) -> Option<CertificateDer<'static>> {
    if body.starts_with(b"-----BEGIN") {
        return rustls_pemfile::certs(&mut &body[..])
            .filter_map(Result::ok)
            .next();
    }
    X509Certificate::from_der(body).ok()?;
    Some(CertificateDer::from(body.to_vec()))
}
