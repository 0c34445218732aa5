//! Connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use taskwire_core::ConnectionStatus;

/// Point-in-time view of a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    /// Current status.
    pub status: ConnectionStatus,
    /// Id the server assigned to the open connection, if announced.
    pub connection_id: Option<String>,
    /// Successful handshakes.
    pub connections_opened: u64,
    /// Failed physical attempts.
    pub failed_attempts: u64,
    /// Text frames received.
    pub messages_received: u64,
    /// Frames handed to an open connection.
    pub messages_sent: u64,
    /// Sends rejected because no connection was open or the queue was full.
    pub sends_dropped: u64,
    /// Connections torn down for unanswered heartbeats.
    pub heartbeat_timeouts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub connections_opened: AtomicU64,
    pub failed_attempts: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub sends_dropped: AtomicU64,
    pub heartbeat_timeouts: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        status: ConnectionStatus,
        connection_id: Option<String>,
    ) -> ChannelStats {
        ChannelStats {
            status,
            connection_id,
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
        }
    }
}
