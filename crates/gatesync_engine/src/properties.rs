//! Gateway properties loaded from the configuration file.
//!
//! The file is flat TOML, one key per setting:
//!
//! ```toml
//! sgURL = "wss://gateway.example.com:4984/db"
//! sgDB = "syncdb"
//! cblite-loc = "/var/lib/gatesync"
//! sgCert = "none"
//! replicationMode = "Pull"
//! continuous = false
//! ```
//!
//! Unknown keys are ignored.

use crate::error::{SyncError, SyncResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_PROPERTIES_FILE: &str = "config.toml";

/// Value of `sgCert` that disables certificate pinning.
pub const NO_CERTIFICATE: &str = "none";

fn default_db_name() -> String {
    "syncdb".to_string()
}

fn default_db_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_cert() -> String {
    NO_CERTIFICATE.to_string()
}

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayProperties {
    /// Gateway database URL.
    #[serde(rename = "sgURL", default)]
    pub sg_url: Option<String>,
    /// Local store name.
    #[serde(rename = "sgDB", default = "default_db_name")]
    pub db_name: String,
    /// Directory holding the local store.
    #[serde(rename = "cblite-loc", default = "default_db_dir")]
    pub db_dir: PathBuf,
    /// Pinned certificate path, or `"none"`.
    #[serde(rename = "sgCert", default = "default_cert")]
    pub cert: String,
    /// Replication direction name.
    #[serde(rename = "replicationMode", default)]
    pub replication_mode: Option<String>,
    /// Keep the session running after catching up.
    #[serde(default)]
    pub continuous: bool,
}

impl GatewayProperties {
    /// Creates properties for `sg_url` with every other key at its default.
    pub fn new(sg_url: impl Into<String>) -> Self {
        Self {
            sg_url: Some(sg_url.into()),
            db_name: default_db_name(),
            db_dir: default_db_dir(),
            cert: default_cert(),
            replication_mode: None,
            continuous: false,
        }
    }

    /// Loads properties from a file.
    ///
    /// # Errors
    ///
    /// A missing, unreadable or malformed file is a configuration error.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::configuration(format!("cannot read properties from {path:?}: {e}"))
        })?;
        Self::parse(&text)
            .map_err(|e| SyncError::configuration(format!("invalid properties in {path:?}: {e}")))
    }

    /// Parses properties from TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Sets the store directory.
    pub fn with_db_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.db_dir = dir.into();
        self
    }

    /// Sets the pinned certificate path (`"none"` disables pinning).
    pub fn with_cert(mut self, cert: impl Into<String>) -> Self {
        self.cert = cert.into();
        self
    }

    /// Sets continuous mode.
    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Returns the pinned certificate path unless pinning is disabled.
    #[must_use]
    pub fn pinned_cert_path(&self) -> Option<&Path> {
        let cert = self.cert.trim();
        if cert.is_empty() || cert == NO_CERTIFICATE {
            None
        } else {
            Some(Path::new(cert))
        }
    }
}
