//! Peer chain capture over a dedicated TLS handshake.
//!
//! The handshake accepts any certificate so that untrusted and misconfigured
//! servers can still be measured; trust is judged afterwards.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::{TCP_CONNECT_TIMEOUT_SECS, TLS_HANDSHAKE_TIMEOUT_SECS};

/// Certificates and protocol version observed during one handshake.
#[derive(Debug, Clone)]
pub struct PeerChain {
    /// Presented chain, leaf first
    pub certificates: Vec<CertificateDer<'static>>,
    /// Negotiated protocol version wire code
    pub tls_version: u16,
}

/// Verifier that records nothing and accepts everything.
#[derive(Debug)]
struct AcceptAnyServerCert {
    schemes: Vec<SignatureScheme>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Wire code of a negotiated protocol version.
fn version_code(version: ProtocolVersion) -> u16 {
    match version {
        ProtocolVersion::TLSv1_3 => 0x0304,
        ProtocolVersion::TLSv1_2 => 0x0303,
        ProtocolVersion::TLSv1_1 => 0x0302,
        ProtocolVersion::TLSv1_0 => 0x0301,
        _ => 0,
    }
}

fn permissive_connector() -> Result<TlsConnector, rustls::Error> {
    let provider = Arc::new(default_provider());
    let schemes = provider
        .signature_verification_algorithms
        .supported_schemes();
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { schemes }))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Connects to `host:port`, completes a TLS handshake and returns the peer chain.
///
/// # Errors
///
/// Returns a description of the failing step (connect, handshake, no certificates).
pub async fn capture_peer_chain(host: &str, port: u16) -> Result<PeerChain, String> {
    let host = host.trim_end_matches('.');
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| format!("invalid server name {host}: {e}"))?;
    let connector = permissive_connector().map_err(|e| format!("TLS configuration error: {e}"))?;

    let sock = match tokio::time::timeout(
        Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
        TcpStream::connect((host, port)),
    )
    .await
    {
        Ok(Ok(sock)) => sock,
        Ok(Err(e)) => return Err(format!("failed to connect to {host}:{port}: {e}")),
        Err(_) => {
            return Err(format!(
                "TCP connection timeout for {host}:{port} ({TCP_CONNECT_TIMEOUT_SECS}s)"
            ))
        }
    };

    let tls_stream = match tokio::time::timeout(
        Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS),
        connector.connect(server_name, sock),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(format!("TLS handshake failed for {host}:{port}: {e}")),
        Err(_) => {
            return Err(format!(
                "TLS handshake timeout for {host}:{port} ({TLS_HANDSHAKE_TIMEOUT_SECS}s)"
            ))
        }
    };

    let (_, conn) = tls_stream.get_ref();
    let tls_version = conn.protocol_version().map(version_code).unwrap_or_default();
    let certificates: Vec<CertificateDer<'static>> = conn
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default();
    if certificates.is_empty() {
        return Err(format!("no peer certificates from {host}:{port}"));
    }

    log::debug!(
        "Captured {} certificate(s) from {host}:{port}, TLS version 0x{tls_version:04x}",
        certificates.len()
    );
    Ok(PeerChain {
        certificates,
        tls_version,
    })
}
