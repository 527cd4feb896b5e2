//! TLS certificate-chain trust validation.
//!
//! Every resolver that receives an answer over HTTPS hands the endpoint to the
//! `CertificateValidator`, which:
//! - captures the presented chain through its own permissive handshake
//! - completes a bare leaf through its AIA `caIssuers` URLs
//! - verifies the chain against the configured PEM root bundle
//! - derives hostname, order, expiry, self-signature and weak-algorithm facts
//!
//! Uses `tokio-rustls` for the handshake, the rustls WebPKI verifier for trust
//! and `x509-parser` for certificate inspection.

mod capture;
mod extract;
mod roots;
mod validate;

// Re-export public API
pub use capture::{capture_peer_chain, PeerChain};
pub use roots::TrustAnchors;
pub use validate::CertificateValidator;

#[cfg(test)]
mod tests;
