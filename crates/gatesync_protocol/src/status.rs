//! Replication status snapshots.
//!
//! The replicator reports its state as a stream of [`ReplicatorStatus`]
//! values. Each one is a full snapshot, never a delta.

use std::fmt;

/// High-level activity of a replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityLevel {
    /// The session has ended. Terminal.
    Stopped,
    /// The endpoint is unreachable.
    Offline,
    /// Connecting to the endpoint.
    Connecting,
    /// Caught up and waiting for new changes (continuous mode).
    Idle,
    /// Transferring changes.
    Busy,
}

impl ActivityLevel {
    /// Returns true for the terminal level.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityLevel::Stopped)
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityLevel::Stopped => "STOPPED",
            ActivityLevel::Offline => "OFFLINE",
            ActivityLevel::Connecting => "CONNECTING",
            ActivityLevel::Idle => "IDLE",
            ActivityLevel::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

/// An error reported inside a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// Error message.
    pub message: String,
    /// Error code: an HTTP status when the gateway answered, otherwise one of
    /// the client codes defined by the engine.
    pub code: i32,
}

impl SessionError {
    /// Creates a session error.
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Replication progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Changes processed so far.
    pub completed: u64,
    /// Changes known so far.
    pub total: u64,
}

impl Progress {
    /// Creates a progress value.
    #[must_use]
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }
}

/// A snapshot of a replication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorStatus {
    /// Current activity.
    pub activity: ActivityLevel,
    /// Error attached to this snapshot, if any.
    pub error: Option<SessionError>,
    /// Progress counters.
    pub progress: Progress,
}

impl ReplicatorStatus {
    /// Creates an error-free snapshot.
    #[must_use]
    pub fn new(activity: ActivityLevel, progress: Progress) -> Self {
        Self {
            activity,
            error: None,
            progress,
        }
    }

    /// Attaches an error.
    #[must_use]
    pub fn with_error(mut self, error: SessionError) -> Self {
        self.error = Some(error);
        self
    }

    /// Shorthand for a busy snapshot.
    #[must_use]
    pub fn busy(completed: u64, total: u64) -> Self {
        Self::new(ActivityLevel::Busy, Progress::new(completed, total))
    }

    /// Shorthand for a stopped snapshot.
    #[must_use]
    pub fn stopped(progress: Progress) -> Self {
        Self::new(ActivityLevel::Stopped, progress)
    }
}

impl fmt::Display for ReplicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.activity, self.progress.completed, self.progress.total
        )?;
        if let Some(error) = &self.error {
            write!(f, " error: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stopped_is_terminal() {
        assert!(ActivityLevel::Stopped.is_terminal());
        for level in [
            ActivityLevel::Offline,
            ActivityLevel::Connecting,
            ActivityLevel::Idle,
            ActivityLevel::Busy,
        ] {
            assert!(!level.is_terminal());
        }
    }

    #[test]
    fn status_display() {
        let status = ReplicatorStatus::stopped(Progress::new(3, 4))
            .with_error(SessionError::new("unauthorized", 401));
        assert_eq!(status.to_string(), "STOPPED 3/4 error: unauthorized (401)");
        assert_eq!(ReplicatorStatus::busy(0, 10).to_string(), "BUSY 0/10");
    }
}
