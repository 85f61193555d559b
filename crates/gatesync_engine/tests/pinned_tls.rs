//! Pinned-certificate handshakes against a local TLS gateway.

use gatesync_engine::{
    GatewayProperties, GatewayTransport, HttpTransport, ReplicatorConfig, SyncError, SyncRequest,
};
use gatesync_protocol::{ChangesRequest, ChangesResponse};
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

const EMPTY_FEED: &str = r#"{"results":[],"last_seq":7}"#;

fn names() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

fn key_der(key: &KeyPair) -> PrivateKeyDer<'static> {
    PrivatePkcs8KeyDer::from(key.serialize_der()).into()
}

fn self_signed(is_ca: bool) -> (Certificate, KeyPair) {
    let mut params = CertificateParams::new(names()).unwrap();
    if is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

/// Returns a CA plus a leaf it issued for the local gateway.
fn issued_leaf() -> (Certificate, Certificate, KeyPair) {
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "gatesync test CA");
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let leaf = CertificateParams::new(names())
        .unwrap()
        .signed_by(&leaf_key, &ca, &ca_key)
        .unwrap();
    (ca, leaf, leaf_key)
}

/// Serves one HTTPS request with an empty changes page. Returns the port.
fn serve_once(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> u16 {
    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(chain, key)
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let conn = ServerConnection::new(Arc::new(config)).unwrap();
        let mut tls = StreamOwned::new(conn, stream);

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match tls.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            EMPTY_FEED.len(),
            EMPTY_FEED
        );
        let _ = tls.write_all(response.as_bytes());
        tls.conn.send_close_notify();
        let _ = tls.flush();
    });
    port
}

fn fetch_pinned(port: u16, pinned: &[u8]) -> Result<ChangesResponse, SyncError> {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(pinned).unwrap();

    let request = SyncRequest::new("alice", "p", vec!["orders".into()]);
    let props = GatewayProperties::new(format!("https://127.0.0.1:{port}/db"))
        .with_cert(file.path().to_string_lossy());
    let config = ReplicatorConfig::build(&request, &props, None)
        .unwrap()
        .with_request_timeout(Duration::from_secs(5));

    let transport = HttpTransport::new(&config)?;
    transport.changes(&ChangesRequest::new(config.channels().to_vec(), 10))
}

#[test]
fn self_signed_leaf_is_trusted() {
    let (cert, key) = self_signed(false);
    let port = serve_once(vec![cert.der().clone()], key_der(&key));

    let page = fetch_pinned(port, cert.pem().as_bytes()).unwrap();
    assert_eq!(page.last_seq.as_str(), "7");
}

#[test]
fn self_signed_ca_certificate_is_trusted() {
    let (cert, key) = self_signed(true);
    let port = serve_once(vec![cert.der().clone()], key_der(&key));

    assert!(fetch_pinned(port, cert.pem().as_bytes()).is_ok());
}

#[test]
fn exact_issued_leaf_is_trusted() {
    let (ca, leaf, leaf_key) = issued_leaf();
    let port = serve_once(vec![leaf.der().clone(), ca.der().clone()], key_der(&leaf_key));

    assert!(fetch_pinned(port, leaf.pem().as_bytes()).is_ok());
}

#[test]
fn pinned_issuer_accepts_its_leaf() {
    let (ca, leaf, leaf_key) = issued_leaf();
    let port = serve_once(vec![leaf.der().clone()], key_der(&leaf_key));

    assert!(fetch_pinned(port, ca.pem().as_bytes()).is_ok());
}

#[test]
fn der_pin_is_accepted() {
    let (cert, key) = self_signed(false);
    let port = serve_once(vec![cert.der().clone()], key_der(&key));

    assert!(fetch_pinned(port, cert.der().as_ref()).is_ok());
}

#[test]
fn other_certificate_is_rejected() {
    let (served, key) = self_signed(false);
    let (pinned, _) = self_signed(false);
    let port = serve_once(vec![served.der().clone()], key_der(&key));

    let err = fetch_pinned(port, pinned.pem().as_bytes()).unwrap_err();
    assert!(err.is_offline(), "expected transport error, got {err:?}");
}
