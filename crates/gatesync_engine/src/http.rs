//! HTTP transport implementation.
//!
//! Talks to the gateway's REST API with a blocking reqwest client. Every
//! request carries basic credentials; when a certificate is pinned, the
//! client uses the pinned verifier in place of the built-in roots.

use crate::config::ReplicatorConfig;
use crate::error::{SyncError, SyncResult};
use crate::pinning::pinned_client_config;
use crate::transport::GatewayTransport;
use gatesync_protocol::{
    BulkDocsRequest, BulkDocsResult, ChangesRequest, ChangesResponse, GatewayErrorBody,
};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};
use url::Url;
use zeroize::Zeroizing;

const USER_AGENT: &str = concat!("gatesync/", env!("CARGO_PKG_VERSION"));

/// HTTP-based gateway transport.
pub struct HttpTransport {
    base_url: Url,
    client: Client,
    username: String,
    password: Zeroizing<String>,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Creates a transport for the gateway named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the pinned certificate is not
    /// valid PEM or DER, or if the HTTP client cannot be built.
    pub fn new(config: &ReplicatorConfig) -> SyncResult<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT);

        if let Some(bytes) = config.pinned_certificate() {
            builder = builder.use_preconfigured_tls(pinned_client_config(bytes)?);
            debug!("Trusting only the pinned gateway certificate");
        }

        let client = builder
            .build()
            .map_err(|e| SyncError::configuration(format!("cannot build HTTP client: {e}")))?;

        let auth = config.authenticator();
        Ok(Self {
            base_url: config.target_url().clone(),
            client,
            username: auth.username().to_string(),
            password: Zeroizing::new(auth.password().to_string()),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the gateway database URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::configuration(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> SyncResult<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::transport("transport closed"));
        }

        let response = request
            .basic_auth(&self.username, Some(self.password.as_str()))
            .send()
            .map_err(|e| SyncError::transport(describe(&e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| SyncError::transport(describe(&e)))?;

        if !status.is_success() {
            if let Some(detail) = GatewayErrorBody::decode(&body) {
                debug!(
                    "Gateway refused request with {}: {} ({})",
                    status, detail.error, detail.reason
                );
            }
            return Err(SyncError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| format!("http status {}", status.as_u16())),
            });
        }

        trace!("Received {} byte response", body.len());
        Ok(body.to_vec())
    }
}

impl GatewayTransport for HttpTransport {
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse> {
        let url = self.endpoint("_changes")?;
        let query = request.query_pairs()?;
        debug!("GET {} since {:?}", url, request.since.as_ref().map(|s| s.as_str()));

        let body = self.send(self.client.get(url).query(&query))?;
        Ok(ChangesResponse::decode(&body)?)
    }

    fn bulk_docs(&self, request: &BulkDocsRequest) -> SyncResult<Vec<BulkDocsResult>> {
        let url = self.endpoint("_bulk_docs")?;
        debug!("POST {} with {} documents", url, request.len());

        let payload = request.encode()?;
        let body = self.send(
            self.client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload),
        )?;
        Ok(BulkDocsResult::decode_all(&body)?)
    }

    fn close(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Flattens an error and its sources into one line.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::GatewayProperties;
    use crate::request::SyncRequest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config(url: &str) -> ReplicatorConfig {
        let request = SyncRequest::new("alice", "p", vec!["a".into()]);
        ReplicatorConfig::build(&request, &GatewayProperties::new(url), None).unwrap()
    }

    #[test]
    fn endpoints_append_to_database_path() {
        let transport = HttpTransport::new(&config("https://gw.example:4984/db")).unwrap();
        assert_eq!(
            transport.endpoint("_changes").unwrap().as_str(),
            "https://gw.example:4984/db/_changes"
        );

        let transport = HttpTransport::new(&config("https://gw.example/db/")).unwrap();
        assert_eq!(
            transport.endpoint("_bulk_docs").unwrap().as_str(),
            "https://gw.example/db/_bulk_docs"
        );
    }

    #[test]
    fn garbage_certificate_is_rejected() {
        let mut cert = NamedTempFile::new().unwrap();
        cert.write_all(b"not a certificate").unwrap();

        let request = SyncRequest::new("alice", "p", vec!["a".into()]);
        let props = GatewayProperties::new("https://gw.example/db")
            .with_cert(cert.path().to_string_lossy());
        let config = ReplicatorConfig::build(&request, &props, None).unwrap();

        assert!(matches!(
            HttpTransport::new(&config),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn unreachable_gateway_is_transport_error() {
        let transport = HttpTransport::new(&config("http://127.0.0.1:9/db")).unwrap();
        let request = ChangesRequest::new(vec!["a".into()], 10);
        let err = transport.changes(&request).unwrap_err();
        assert!(err.is_offline());
    }

    #[test]
    fn closed_transport_fails_fast() {
        let transport = HttpTransport::new(&config("http://127.0.0.1:9/db")).unwrap();
        transport.close().unwrap();
        let err = transport
            .bulk_docs(&BulkDocsRequest::new())
            .unwrap_err();
        assert!(err.is_offline());
    }

    #[test]
    fn debug_hides_password() {
        let transport = HttpTransport::new(&config("https://gw.example/db")).unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("\"p\""));
    }
}
