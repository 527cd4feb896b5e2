//! Root trust bundle and WebPKI chain verification.

use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;

/// Trusted roots loaded once at startup.
///
/// A bundle that cannot be loaded is kept as its error text: every later
/// verdict fails closed with that text instead of aborting the run.
#[derive(Debug, Clone)]
pub struct TrustAnchors {
    verifier: Result<Arc<WebPkiServerVerifier>, String>,
}

impl TrustAnchors {
    /// Loads a PEM bundle from `path`; `None` leaves the store unavailable.
    pub fn from_pem_file(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::unavailable("failed to read root certificate: no root bundle configured");
        };
        match std::fs::read(path) {
            Ok(pem) => Self::from_pem(&pem),
            Err(e) => Self::unavailable(format!(
                "failed to read root certificate: {}: {e}",
                path.display()
            )),
        }
    }

    /// Builds the store from PEM text holding one or more certificates.
    pub fn from_pem(pem: &[u8]) -> Self {
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
            .filter_map(Result::ok)
            .collect();
        let mut store = RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(certs);
        if added == 0 {
            return Self::unavailable(
                "failed to read root certificate: no usable certificates in bundle",
            );
        }
        log::info!("Loaded {added} trusted root certificate(s), ignored {ignored}");

        let verifier =
            WebPkiServerVerifier::builder_with_provider(Arc::new(store), Arc::new(default_provider()))
                .build()
                .map_err(|e| format!("failed to read root certificate: {e}"));
        Self { verifier }
    }

    /// A store that rejects everything with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::warn!("Root trust store unavailable: {reason}");
        Self {
            verifier: Err(reason),
        }
    }

    /// Whether roots were loaded.
    pub fn is_available(&self) -> bool {
        self.verifier.is_ok()
    }

    /// Verifies `chain` (leaf first) for `hostname` against the loaded roots.
    ///
    /// Entries after the leaf are offered as intermediates in any order.
    pub fn verify(&self, chain: &[CertificateDer<'static>], hostname: &str) -> Result<(), String> {
        let verifier = self.verifier.as_ref().map_err(Clone::clone)?;
        let (leaf, intermediates) = chain
            .split_first()
            .ok_or_else(|| "certificate verify failed: empty chain".to_string())?;
        let server_name = ServerName::try_from(hostname.trim_end_matches('.').to_string())
            .map_err(|e| format!("certificate verify failed: {e}"))?;

        verifier
            .verify_server_cert(leaf, intermediates, &server_name, &[], UnixTime::now())
            .map(|_| ())
            .map_err(|e| format!("certificate verify failed: {e}"))
    }
}
