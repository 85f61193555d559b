//! Replication session configuration.

use crate::error::{SyncError, SyncResult};
use crate::properties::GatewayProperties;
use crate::request::SyncRequest;
use gatesync_protocol::{Document, DocumentFlags};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

/// Direction of a replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicatorType {
    /// Gateway to local store.
    Pull,
    /// Local store to gateway.
    Push,
    /// Both directions, pull first.
    PullAndPush,
}

impl ReplicatorType {
    /// Maps a direction name to a type.
    ///
    /// Matching ignores case, spaces and underscores. Absent or unrecognized
    /// names mean [`ReplicatorType::Pull`].
    #[must_use]
    pub fn from_mode(mode: Option<&str>) -> Self {
        let normalized: String = mode
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "push" => ReplicatorType::Push,
            "pullandpush" | "pushandpull" | "bidirectional" => ReplicatorType::PullAndPush,
            _ => ReplicatorType::Pull,
        }
    }

    /// Returns true if the session reads from the gateway.
    #[must_use]
    pub fn pulls(&self) -> bool {
        matches!(self, ReplicatorType::Pull | ReplicatorType::PullAndPush)
    }

    /// Returns true if the session writes to the gateway.
    #[must_use]
    pub fn pushes(&self) -> bool {
        matches!(self, ReplicatorType::Push | ReplicatorType::PullAndPush)
    }
}

/// A document filter: return `false` to keep a change out of replication.
pub type ReplicationFilter = Arc<dyn Fn(&Document, DocumentFlags) -> bool + Send + Sync>;

/// The filter installed in both directions: tombstones never replicate.
#[must_use]
pub fn skip_deleted() -> ReplicationFilter {
    Arc::new(|_document: &Document, flags: DocumentFlags| !flags.is_deleted())
}

/// HTTP basic credentials.
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: String,
    password: Zeroizing<String>,
}

impl BasicAuthenticator {
    /// Creates an authenticator.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a replicator needs to run one session.
///
/// Built once by [`ReplicatorConfig::build`]; the `with_*` tunables may be
/// applied before the configuration is handed to a replicator.
#[derive(Clone)]
pub struct ReplicatorConfig {
    target_url: Url,
    replicator_type: ReplicatorType,
    channels: Vec<String>,
    pull_filter: ReplicationFilter,
    push_filter: ReplicationFilter,
    pinned_certificate: Option<Vec<u8>>,
    continuous: bool,
    authenticator: BasicAuthenticator,
    batch_size: u32,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl ReplicatorConfig {
    /// Builds a session configuration from a request and the gateway properties.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Configuration`] if `sgURL` is missing or malformed
    /// - [`SyncError::CertificateLoad`] if a pinned certificate is configured
    ///   but cannot be read
    pub fn build(
        request: &SyncRequest,
        properties: &GatewayProperties,
        direction: Option<&str>,
    ) -> SyncResult<Self> {
        let raw_url = properties
            .sg_url
            .as_deref()
            .ok_or_else(|| SyncError::configuration("sgURL is not set"))?;
        let target_url = parse_target_url(raw_url)?;

        let pinned_certificate = match properties.pinned_cert_path() {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| SyncError::CertificateLoad {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!("Pinning gateway certificate from {:?}", path);
                Some(bytes)
            }
            None => None,
        };

        let replicator_type = ReplicatorType::from_mode(direction);
        debug!("Replication mode is {:?}", replicator_type);

        Ok(Self {
            target_url,
            replicator_type,
            channels: request.channels().to_vec(),
            pull_filter: skip_deleted(),
            push_filter: skip_deleted(),
            pinned_certificate,
            continuous: properties.continuous,
            authenticator: BasicAuthenticator::new(request.user(), request.password()),
            batch_size: 200,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(10),
        })
    }

    /// Sets the number of changes requested per page.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how long a continuous session idles between cycles.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the gateway database URL.
    #[must_use]
    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    /// Returns the replication direction.
    #[must_use]
    pub fn replicator_type(&self) -> ReplicatorType {
        self.replicator_type
    }

    /// Returns the channels exactly as requested.
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Returns the filter applied to pulled changes.
    #[must_use]
    pub fn pull_filter(&self) -> &ReplicationFilter {
        &self.pull_filter
    }

    /// Returns the filter applied to pushed changes.
    #[must_use]
    pub fn push_filter(&self) -> &ReplicationFilter {
        &self.push_filter
    }

    /// Returns the pinned certificate bytes, if pinning is enabled.
    #[must_use]
    pub fn pinned_certificate(&self) -> Option<&[u8]> {
        self.pinned_certificate.as_deref()
    }

    /// Returns true if the session keeps running after catching up.
    #[must_use]
    pub fn continuous(&self) -> bool {
        self.continuous
    }

    /// Returns the credentials.
    #[must_use]
    pub fn authenticator(&self) -> &BasicAuthenticator {
        &self.authenticator
    }

    /// Returns the changes page size.
    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Returns the HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the idle interval of continuous sessions.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the key under which pull progress is checkpointed.
    ///
    /// Channel order does not affect the key.
    #[must_use]
    pub fn checkpoint_key(&self) -> String {
        let mut channels = self.channels.clone();
        channels.sort();
        channels.dedup();
        format!("pull|{}|{}", self.target_url, channels.join(","))
    }
}

impl fmt::Debug for ReplicatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatorConfig")
            .field("target_url", &self.target_url.as_str())
            .field("replicator_type", &self.replicator_type)
            .field("channels", &self.channels)
            .field(
                "pinned_certificate",
                &self.pinned_certificate.as_ref().map(Vec::len),
            )
            .field("continuous", &self.continuous)
            .field("authenticator", &self.authenticator)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Parses the gateway URL, mapping WebSocket schemes onto their HTTP
/// counterparts used by the REST API.
fn parse_target_url(raw: &str) -> SyncResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SyncError::configuration(format!("bad sync gateway URL {raw:?}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => {
            return Err(SyncError::configuration(format!(
                "unsupported sync gateway URL scheme {other:?}"
            )))
        }
    };
    if url.host_str().is_none() {
        return Err(SyncError::configuration(format!(
            "sync gateway URL {raw:?} has no host"
        )));
    }

    if url.scheme() == scheme {
        return Ok(url);
    }
    let rest = &url.as_str()[url.scheme().len()..];
    Url::parse(&format!("{scheme}{rest}"))
        .map_err(|e| SyncError::configuration(format!("bad sync gateway URL {raw:?}: {e}")))
}
