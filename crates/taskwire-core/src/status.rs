//! Connection status as seen by observers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the channel's single physical connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection and none pending. Initial state.
    #[default]
    Disconnected,
    /// A connection attempt is in flight or scheduled.
    Connecting,
    /// The handshake succeeded and the connection is open.
    Connected,
    /// Reconnection attempts were exhausted.
    Error,
}

impl ConnectionStatus {
    /// Wire/display name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Whether a connect request in this state must be ignored.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status notification delivered to observers.
///
/// `attempt` is the 1-based number of the physical attempt being scheduled
/// or in flight while [`ConnectionStatus::Connecting`], and `0` in every
/// other state. Two notifications are duplicates only when both fields match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// The new status.
    pub status: ConnectionStatus,
    /// Attempt counter for UI feedback.
    pub attempt: u32,
}

impl StatusChange {
    /// Status with no attempt attached.
    pub const fn settled(status: ConnectionStatus) -> Self {
        Self { status, attempt: 0 }
    }

    /// `Connecting` for the given attempt.
    pub const fn connecting(attempt: u32) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            attempt,
        }
    }
}

impl From<ConnectionStatus> for StatusChange {
    fn from(status: ConnectionStatus) -> Self {
        Self::settled(status)
    }
}
