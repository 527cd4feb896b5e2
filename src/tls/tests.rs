use std::path::PathBuf;
use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::*;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/certs")
        .join(name)
}

fn load_certs(name: &str) -> Vec<CertificateDer<'static>> {
    let pem = std::fs::read(fixture(name)).expect("fixture");
    rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .expect("certs")
}

fn load_key(name: &str) -> PrivateKeyDer<'static> {
    let pem = std::fs::read(fixture(name)).expect("fixture");
    rustls_pemfile::private_key(&mut &pem[..])
        .expect("key")
        .expect("no key in fixture")
}

fn validator(anchors: TrustAnchors) -> CertificateValidator {
    CertificateValidator::new(Arc::new(anchors), Arc::new(reqwest::Client::new()))
}

fn test_anchors() -> TrustAnchors {
    TrustAnchors::from_pem_file(Some(&fixture("root.pem")))
}

/// Serves `chain` with `key` on an ephemeral port; each connection gets one
/// handshake and is then closed.
async fn spawn_tls_server(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> u16 {
    let config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .expect("versions")
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .expect("server config");
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut stream) = acceptor.accept(sock).await {
                    let _ = stream.shutdown().await;
                }
            });
        }
    });
    port
}

fn leaf_chain() -> Vec<CertificateDer<'static>> {
    let mut chain = load_certs("leaf.pem");
    chain.extend(load_certs("intermediate.pem"));
    chain
}

#[tokio::test]
async fn test_capture_trusted_chain() {
    let port = spawn_tls_server(leaf_chain(), load_key("leaf.key")).await;

    let info = validator(test_anchors())
        .capture("localhost", port)
        .await
        .expect("capture");

    assert!(info.is_trusted, "verify error: {}", info.verify_error);
    assert!(info.verify_error.is_empty());
    assert!(info.is_hostname_match);
    assert_eq!(info.is_in_order, "yes");
    assert!(!info.is_expired);
    assert!(!info.is_self_signed);
    assert_eq!(info.tls_version, 0x0304);
    assert_eq!(info.subject, "mail.example.test");
    assert_eq!(info.issuer, "Mailconf Test Intermediate");
    assert_eq!(info.signature_alg, "ECDSA-SHA256");
    assert!(info.alg_warning.is_empty());
    assert_eq!(info.raw_certs.len(), 2);
}

#[tokio::test]
async fn test_capture_without_roots_fails_closed() {
    let port = spawn_tls_server(leaf_chain(), load_key("leaf.key")).await;

    let info = validator(TrustAnchors::from_pem_file(None))
        .capture("localhost", port)
        .await
        .expect("capture");

    assert!(!info.is_trusted);
    assert!(info
        .verify_error
        .starts_with("failed to read root certificate"));
    // Facts independent of trust are still reported
    assert!(info.is_hostname_match);
    assert_eq!(info.is_in_order, "yes");
}

#[tokio::test]
async fn test_capture_self_signed_server() {
    let port = spawn_tls_server(load_certs("self_signed.pem"), load_key("self_signed.key")).await;

    let info = validator(test_anchors())
        .capture("localhost", port)
        .await
        .expect("capture");

    assert!(!info.is_trusted);
    assert!(info.verify_error.starts_with("certificate verify failed"));
    assert!(info.is_self_signed);
    assert!(info.is_hostname_match);
    assert_eq!(info.is_in_order, "single");
}

#[tokio::test]
async fn test_capture_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = validator(test_anchors())
        .capture("127.0.0.1", port)
        .await
        .unwrap_err();
    assert!(err.starts_with("failed to connect to 127.0.0.1"), "{err}");
}

#[tokio::test]
async fn test_inspect_hostname_mismatch_is_untrusted() {
    let info = validator(test_anchors())
        .inspect(&leaf_chain(), 0x0303, "other.example.test")
        .await;
    assert!(!info.is_hostname_match);
    assert!(!info.is_trusted);
    assert!(info.verify_error.starts_with("certificate verify failed"));
    assert_eq!(info.tls_version, 0x0303);
}

#[tokio::test]
async fn test_inspect_wildcard_hostname() {
    let info = validator(test_anchors())
        .inspect(&leaf_chain(), 0x0304, "imap.wild.example.test")
        .await;
    assert!(info.is_hostname_match);
    assert!(info.is_trusted, "verify error: {}", info.verify_error);

    let info = validator(test_anchors())
        .inspect(&leaf_chain(), 0x0304, "a.b.wild.example.test")
        .await;
    assert!(!info.is_hostname_match);
}

#[tokio::test]
async fn test_inspect_out_of_order_chain() {
    let mut chain = load_certs("leaf.pem");
    chain.extend(load_certs("root.pem"));
    chain.extend(load_certs("intermediate.pem"));

    let info = validator(test_anchors())
        .inspect(&chain, 0x0304, "mail.example.test")
        .await;
    assert_eq!(info.is_in_order, "not");
    assert_eq!(info.raw_certs.len(), 3);
}

#[tokio::test]
async fn test_inspect_chain_without_issuer_counts_as_ordered() {
    let mut chain = load_certs("leaf.pem");
    chain.extend(load_certs("root.pem"));

    let info = validator(test_anchors())
        .inspect(&chain, 0x0304, "mail.example.test")
        .await;
    assert_eq!(info.is_in_order, "yes");
    assert!(!info.is_trusted);
}

#[tokio::test]
async fn test_inspect_bare_leaf_without_aia() {
    let info = validator(test_anchors())
        .inspect(&load_certs("leaf.pem"), 0x0304, "mail.example.test")
        .await;
    assert_eq!(info.is_in_order, "single");
    assert!(!info.is_trusted);
    assert!(info.verify_error.starts_with("certificate verify failed"));
}

#[tokio::test]
async fn test_inspect_weak_rsa_key() {
    let info = validator(test_anchors())
        .inspect(&load_certs("weak_rsa.pem"), 0x0304, "weak.example.test")
        .await;
    assert!(info.is_self_signed);
    assert_eq!(info.signature_alg, "SHA256-RSA");
    assert_eq!(info.alg_warning, "Size of RSA key should be at least 2048 bits");
}

#[tokio::test]
async fn test_inspect_sha1_signature() {
    let info = validator(test_anchors())
        .inspect(&load_certs("sha1_rsa.pem"), 0x0304, "sha1.example.test")
        .await;
    assert_eq!(info.signature_alg, "SHA1-RSA");
    assert_eq!(
        info.alg_warning,
        "Signed with SHA1-RSA, which is an outdated signature algorithm"
    );
}

#[tokio::test]
async fn test_inspect_unparsable_leaf() {
    let chain = vec![CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x00])];
    let info = validator(test_anchors()).inspect(&chain, 0, "x").await;
    assert!(!info.is_trusted);
    assert_eq!(info.is_in_order, "single");
    assert_eq!(info.raw_certs.len(), 1);
}

#[test]
fn test_trust_anchors_reject_empty_bundle() {
    let anchors = TrustAnchors::from_pem(b"no certificates here");
    assert!(!anchors.is_available());
    let err = anchors.verify(&load_certs("leaf.pem"), "localhost").unwrap_err();
    assert!(err.starts_with("failed to read root certificate"));
}

#[test]
fn test_trust_anchors_missing_file() {
    let anchors = TrustAnchors::from_pem_file(Some(&fixture("does-not-exist.pem")));
    assert!(!anchors.is_available());
}
