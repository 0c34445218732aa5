//! JSON message envelope for both directions of the channel.
//!
//! Every frame is a UTF-8 JSON object carrying a `type` discriminator.
//! Inbound frames decode into an [`Inbound`] whose [`MessageKind`] is a closed
//! set of the types the task server emits plus an [`MessageKind::Unknown`]
//! fallback; the full object is kept verbatim as the payload so subscribers
//! see exactly what the server sent.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EnvelopeError;

/// Subscription key that receives every forwarded message regardless of type.
pub const ANY_EVENT: &str = "*";

/// Decoded `type` discriminator of an inbound frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Heartbeat probe sent by the peer.
    Ping,
    /// Heartbeat acknowledgement.
    Pong,
    /// Welcome message carrying the server-assigned `connection_id`.
    Connection,
    /// Server keepalive broadcast with the active connection count.
    Heartbeat,
    /// A task was created.
    TaskCreated,
    /// A task was modified.
    TaskUpdated,
    /// A task was removed.
    TaskDeleted,
    /// A task moved between statuses.
    TaskStatusChanged,
    /// Server-side error report (`message`, `code`).
    Error,
    /// Connection statistics reply.
    Stats,
    /// Acknowledgement of a `subscribe` request.
    SubscriptionAck,
    /// Administrator broadcast.
    SystemBroadcast,
    /// Notice sent right before an administrative disconnect.
    ForcedDisconnect,
    /// Any other `type` value.
    Unknown(String),
}

impl MessageKind {
    /// The `type` string this kind was decoded from.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Connection => "connection",
            Self::Heartbeat => "heartbeat",
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::TaskDeleted => "task_deleted",
            Self::TaskStatusChanged => "task_status_changed",
            Self::Error => "error",
            Self::Stats => "stats",
            Self::SubscriptionAck => "subscription_ack",
            Self::SystemBroadcast => "system_broadcast",
            Self::ForcedDisconnect => "forced_disconnect",
            Self::Unknown(other) => other,
        }
    }

    /// Reserved heartbeat traffic that is never forwarded to subscribers.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }

    /// Task lifecycle events kept in the recent-events history.
    pub fn is_domain_event(&self) -> bool {
        matches!(
            self,
            Self::TaskCreated | Self::TaskUpdated | Self::TaskDeleted | Self::TaskStatusChanged
        )
    }
}

impl From<&str> for MessageKind {
    fn from(value: &str) -> Self {
        match value {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "connection" => Self::Connection,
            "heartbeat" => Self::Heartbeat,
            "task_created" => Self::TaskCreated,
            "task_updated" => Self::TaskUpdated,
            "task_deleted" => Self::TaskDeleted,
            "task_status_changed" => Self::TaskStatusChanged,
            "error" => Self::Error,
            "stats" => Self::Stats,
            "subscription_ack" => Self::SubscriptionAck,
            "system_broadcast" => Self::SystemBroadcast,
            "forced_disconnect" => Self::ForcedDisconnect,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    /// Decoded discriminator.
    pub kind: MessageKind,
    /// The whole JSON object as received.
    pub payload: Value,
}

impl Inbound {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        let payload: Value = serde_json::from_str(text)?;
        let Some(object) = payload.as_object() else {
            return Err(EnvelopeError::NotAnObject);
        };
        let kind = match object.get("type") {
            Some(Value::String(t)) => MessageKind::from(t.as_str()),
            Some(_) => return Err(EnvelopeError::InvalidType),
            None => return Err(EnvelopeError::MissingType),
        };
        Ok(Self { kind, payload })
    }

    /// Registry key for this frame.
    pub fn event_type(&self) -> &str {
        self.kind.as_str()
    }

    /// Server-assigned connection id from a `connection` welcome message.
    pub fn connection_id(&self) -> Option<&str> {
        if self.kind != MessageKind::Connection {
            return None;
        }
        self.payload.get("connection_id").and_then(Value::as_str)
    }

    /// Optional `data` field echoed by `ping`/`pong`.
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data").filter(|v| !v.is_null())
    }
}

/// Messages the client sends to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe.
    Ping {
        /// Opaque value the server echoes back.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// RFC 3339 send time.
        timestamp: String,
    },
    /// Reply to a server-initiated `ping`.
    Pong {
        /// Echo of the probe's `data`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// RFC 3339 send time.
        timestamp: String,
    },
    /// Ask the server to deliver the listed event types.
    Subscribe {
        /// Event type names.
        events: Vec<String>,
    },
    /// Request connection statistics.
    Stats,
}

impl ClientMessage {
    /// A heartbeat probe stamped with the current time.
    pub fn probe() -> Self {
        Self::Ping {
            data: None,
            timestamp: now_rfc3339(),
        }
    }

    /// Answer to a peer probe.
    pub fn pong(data: Option<Value>) -> Self {
        Self::Pong {
            data,
            timestamp: now_rfc3339(),
        }
    }

    /// Subscription request for the given event types.
    pub fn subscribe<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Subscribe {
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
