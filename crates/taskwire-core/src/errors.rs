//! Error types for the channel.
//!
//! None of these ever cross the consumer-facing API: connection failures are
//! reported through status transitions. They flow between the transport,
//! the state machine, and the logs.

use std::time::Duration;

use thiserror::Error;

/// Failure to decode an inbound frame into an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The object has no `type` field.
    #[error("frame has no `type` field")]
    MissingType,
    /// The `type` field is not a string.
    #[error("frame `type` field is not a string")]
    InvalidType,
}

/// Errors raised while building or operating a channel connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Configuration rejected by validation.
    #[error("invalid channel configuration: {0}")]
    Config(String),
    /// The endpoint URL could not be built.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    /// The WebSocket handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
    /// The peer sent a frame that violates the envelope contract.
    #[error("protocol violation: {0}")]
    Protocol(#[from] EnvelopeError),
    /// I/O failure on an open connection.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Whether the state machine may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Handshake(_) | Self::Timeout(_) | Self::Protocol(_) | Self::Transport(_) => true,
            Self::Config(_) | Self::Url(_) => false,
        }
    }
}
