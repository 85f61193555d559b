//! Gateway certificate pinning.
//!
//! A pinned gateway is trusted when the pinned certificate appears in the
//! chain it presents, whatever its basic constraints or issuer. Otherwise the
//! pinned certificate is the only trust anchor, so pinning a private CA still
//! accepts the leaves it issued. Handshake signatures are always verified.

use crate::error::{SyncError, SyncResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tracing::trace;

/// Builds a TLS client configuration that trusts only `pinned`.
///
/// `pinned` is PEM text or raw DER.
pub(crate) fn pinned_client_config(pinned: &[u8]) -> SyncResult<ClientConfig> {
    let provider = Arc::new(ring::default_provider());
    let verifier = PinnedCertVerifier::new(parse_certificate(pinned)?, Arc::clone(&provider))?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SyncError::configuration(format!("cannot configure TLS: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(config)
}

/// Accepts PEM text or raw DER.
fn parse_certificate(bytes: &[u8]) -> SyncResult<CertificateDer<'static>> {
    if bytes.trim_ascii_start().starts_with(b"-----BEGIN") {
        CertificateDer::from_pem_slice(bytes)
            .map_err(|e| SyncError::configuration(format!("invalid pinned certificate: {e}")))
    } else {
        Ok(CertificateDer::from(bytes.to_vec()))
    }
}

#[derive(Debug)]
struct PinnedCertVerifier {
    pinned: CertificateDer<'static>,
    anchored: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    fn new(pinned: CertificateDer<'static>, provider: Arc<CryptoProvider>) -> SyncResult<Self> {
        let mut roots = RootCertStore::empty();
        roots
            .add(pinned.clone())
            .map_err(|e| SyncError::configuration(format!("invalid pinned certificate: {e}")))?;
        let anchored =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()
                .map_err(|e| {
                    SyncError::configuration(format!("cannot build certificate verifier: {e}"))
                })?;

        Ok(Self {
            pinned,
            anchored,
            provider,
        })
    }

    fn is_pinned(&self, certificate: &CertificateDer<'_>) -> bool {
        certificate.as_ref() == self.pinned.as_ref()
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.is_pinned(end_entity) || intermediates.iter().any(|c| self.is_pinned(c)) {
            trace!("Gateway presented the pinned certificate");
            return Ok(ServerCertVerified::assertion());
        }
        self.anchored
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            pinned_client_config(b"not a certificate"),
            Err(SyncError::Configuration(_))
        ));
        assert!(matches!(
            pinned_client_config(b"-----BEGIN CERTIFICATE-----\n"),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn pem_and_der_name_the_same_certificate() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let from_pem = parse_certificate(generated.cert.pem().as_bytes()).unwrap();
        let from_der = parse_certificate(generated.cert.der().as_ref()).unwrap();

        assert_eq!(from_pem, from_der);
        assert!(pinned_client_config(generated.cert.der().as_ref()).is_ok());
    }
}
