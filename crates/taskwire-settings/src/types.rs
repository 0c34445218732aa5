//! Settings type definitions.
//!
//! All types use camelCase JSON. Every struct is `#[serde(default)]`, so a
//! partial file only overrides the keys it names. Channel timing keys keep
//! the short names consumers already use (`baseDelay`, `heartbeatInterval`,
//! ...) and are expressed in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskwire_core::logging::LogFormat;
use taskwire_core::retry::{self, BackoffPolicy};
use url::Url;

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "channel": { "serverUrl": "wss://tasks.example.com", "maxAttempts": 8 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskwireSettings {
    /// Real-time channel settings.
    pub channel: ChannelSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Connection, keepalive, and reconnection settings for the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Base server URL (`ws`, `wss`, `http`, or `https`).
    pub server_url: String,
    /// Path of the event endpoint, appended to the server URL path.
    pub endpoint_path: String,
    /// Query parameter that carries the credential.
    pub token_param: String,
    /// Initial reconnection delay in ms.
    #[serde(rename = "baseDelay")]
    pub base_delay_ms: u64,
    /// Reconnection delay ceiling in ms.
    #[serde(rename = "maxDelay")]
    pub max_delay_ms: u64,
    /// Failed attempts before the channel gives up.
    pub max_attempts: u32,
    /// Upper bound of the random jitter added per backoff step, in ms.
    #[serde(rename = "jitter")]
    pub jitter_ms: u64,
    /// Liveness probe period in ms.
    #[serde(rename = "heartbeatInterval")]
    pub heartbeat_interval_ms: u64,
    /// Unanswered probes tolerated before the connection is declared dead.
    pub max_missed_heartbeats: u32,
    /// Pause between the disconnect and connect halves of a manual reconnect, in ms.
    #[serde(rename = "reconnectDelay")]
    pub reconnect_delay_ms: u64,
    /// Handshake timeout in ms.
    #[serde(rename = "connectTimeout")]
    pub connect_timeout_ms: u64,
    /// Size of the recent domain-event history.
    pub recent_events_capacity: usize,
    /// Outbound frames buffered between `send` and the socket writer.
    pub outbound_capacity: usize,
    /// Subscriber fault records kept for diagnostics.
    pub fault_log_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000".to_string(),
            endpoint_path: "/ws/tasks".to_string(),
            token_param: "token".to_string(),
            base_delay_ms: retry::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: retry::DEFAULT_MAX_DELAY_MS,
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            jitter_ms: retry::DEFAULT_JITTER_MS,
            heartbeat_interval_ms: 30_000,
            max_missed_heartbeats: 3,
            reconnect_delay_ms: 1000,
            connect_timeout_ms: 10_000,
            recent_events_capacity: 50,
            outbound_capacity: 256,
            fault_log_capacity: 32,
        }
    }
}

impl ChannelSettings {
    /// Settings pointing at the given server with every other value defaulted.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Backoff parameters for the reconnection policy.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            max_attempts: self.max_attempts,
            jitter_ms: self.jitter_ms,
        }
    }

    /// Liveness probe period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Manual reconnect pause.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Full endpoint URL with the credential attached as a query parameter.
    ///
    /// `http`/`https` server URLs are mapped to `ws`/`wss`.
    pub fn endpoint_url(&self, token: &str) -> std::result::Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.server_url)?;
        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            // http(s) -> ws(s) is always permitted between special schemes
            let _ = url.set_scheme(scheme);
        }
        let path = format!(
            "{}{}",
            url.path().trim_end_matches('/'),
            self.endpoint_path
        );
        url.set_path(&path);
        let _ = url
            .query_pairs_mut()
            .append_pair(&self.token_param, token);
        Ok(url)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| invalid(format!("serverUrl {:?}: {e}", self.server_url)))?;
        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(invalid(format!(
                "serverUrl scheme must be ws, wss, http, or https, got {}",
                url.scheme()
            )));
        }
        if !self.endpoint_path.starts_with('/') {
            return Err(invalid("endpointPath must start with '/'"));
        }
        if self.token_param.is_empty() {
            return Err(invalid("tokenParam cannot be empty"));
        }
        if self.base_delay_ms == 0 {
            return Err(invalid("baseDelay must be > 0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid("maxDelay must be >= baseDelay"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("maxAttempts must be > 0"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(invalid("heartbeatInterval must be > 0"));
        }
        if self.max_missed_heartbeats == 0 {
            return Err(invalid("maxMissedHeartbeats must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connectTimeout must be > 0"));
        }
        if self.recent_events_capacity == 0 {
            return Err(invalid("recentEventsCapacity must be > 0"));
        }
        if self.outbound_capacity == 0 {
            return Err(invalid("outboundCapacity must be > 0"));
        }
        if self.fault_log_capacity == 0 {
            return Err(invalid("faultLogCapacity must be > 0"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(message.into())
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `taskwire_channel=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
