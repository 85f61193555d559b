//! The credential and channel request captured from the command line.

use std::fmt;
use zeroize::Zeroizing;

/// Who is syncing and which channels they want.
///
/// Channel order is kept as given so configurations built from the same
/// request are reproducible.
#[derive(Clone)]
pub struct SyncRequest {
    user: String,
    password: Zeroizing<String>,
    channels: Vec<String>,
}

impl SyncRequest {
    /// Creates a request.
    pub fn new(user: impl Into<String>, password: impl Into<String>, channels: Vec<String>) -> Self {
        Self {
            user: user.into(),
            password: Zeroizing::new(password.into()),
            channels,
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the requested channels in their original order.
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRequest")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("channels", &self.channels)
            .finish()
    }
}
