//! Consumer-facing channel handle.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use taskwire_core::{ANY_EVENT, ChannelError, ClientMessage, ConnectionStatus, StatusChange};
use taskwire_settings::ChannelSettings;

use crate::actor::{ChannelActor, Command, Shared};
use crate::credentials::CredentialProvider;
use crate::recent::RecentEvent;
use crate::registry::SubscriberFault;
use crate::stats::{ChannelStats, Counters};
use crate::subscription::Subscription;
use crate::transport::{Connector, WsConnector};

/// A resilient real-time connection to the task event endpoint.
///
/// The channel owns one background task that drives the connection. All
/// methods return without waiting on the network; failures surface only as
/// status transitions. Dropping the channel closes the connection and stops
/// the task.
pub struct Channel {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Channel {
    /// Channel over WebSocket.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        settings: ChannelSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ChannelError> {
        let connector = Arc::new(WsConnector::new(settings.outbound_capacity));
        Self::with_connector(settings, credentials, connector)
    }

    /// Channel over a custom [`Connector`].
    pub fn with_connector(
        settings: ChannelSettings,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ChannelError> {
        settings
            .validate()
            .map_err(|e| ChannelError::Config(e.to_string()))?;
        let runtime = Handle::try_current()
            .map_err(|e| ChannelError::Config(format!("no tokio runtime: {e}")))?;

        let shared = Arc::new(Shared::new(&settings));
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = ChannelActor::new(settings, credentials, connector, Arc::clone(&shared), rx);
        let _ = runtime.spawn(actor.run());

        Ok(Self {
            shared,
            commands: tx,
        })
    }

    // ─── Connection control ─────────────────────────────────────────────

    /// Start connecting.
    ///
    /// A no-op while connecting or connected, and when no credential is
    /// available. Returns once the attempt has been initiated.
    pub async fn connect(&self) {
        self.request(Command::Connect).await;
    }

    /// Close the connection and stop any automatic reconnection.
    pub async fn disconnect(&self) {
        self.request(Command::Disconnect).await;
    }

    /// Disconnect, then connect again after the configured reconnect delay.
    ///
    /// A [`Channel::disconnect`] during the delay cancels the second half.
    pub async fn reconnect(&self) {
        self.request(Command::Reconnect).await;
    }

    /// Tell the channel its credential was replaced.
    ///
    /// Restarts the connection sequence when attempts were exhausted
    /// (`error`). A manually disconnected channel stays disconnected, and an
    /// active one picks up the new credential on its next attempt.
    pub async fn credentials_changed(&self) {
        self.request(Command::CredentialsChanged).await;
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(command(ack)).is_err() {
            return;
        }
        let _ = done.await;
    }

    // ─── Outbound ───────────────────────────────────────────────────────

    /// Send a JSON payload.
    ///
    /// Returns `true` only if the frame was handed to an open connection.
    /// Nothing is queued while disconnected.
    pub fn send(&self, payload: &Value) -> bool {
        match serde_json::to_string(payload) {
            Ok(json) => self.send_text(json),
            Err(_) => false,
        }
    }

    /// Send a typed client message.
    pub fn send_message(&self, message: &ClientMessage) -> bool {
        match message.to_json() {
            Ok(json) => self.send_text(json),
            Err(_) => false,
        }
    }

    fn send_text(&self, json: String) -> bool {
        let counters = &self.shared.counters;
        let sent = self.shared.status.status() == ConnectionStatus::Connected
            && self
                .shared
                .outbound
                .lock()
                .as_ref()
                .is_some_and(|tx| tx.try_send(json).is_ok());
        if sent {
            Counters::bump(&counters.messages_sent);
        } else {
            Counters::bump(&counters.sends_dropped);
            debug!("send dropped, no open connection");
        }
        sent
    }

    // ─── Subscriptions ──────────────────────────────────────────────────

    /// Receive every message of `event_type`.
    ///
    /// Works in any status and survives reconnects. The callback runs on the
    /// channel task and should return quickly.
    pub fn subscribe<F>(&self, event_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.registry.subscribe(event_type, callback)
    }

    /// Receive every forwarded message regardless of type.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(ANY_EVENT, callback)
    }

    /// Observe status changes. `callback` is invoked once immediately with
    /// the current status.
    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(StatusChange) + Send + Sync + 'static,
    {
        self.shared.status.observe(callback)
    }

    // ─── Introspection ──────────────────────────────────────────────────

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.status()
    }

    /// Current status with its attempt number.
    pub fn status_change(&self) -> StatusChange {
        self.shared.status.current()
    }

    /// Id the server assigned to the open connection.
    pub fn connection_id(&self) -> Option<String> {
        self.shared.connection_id.lock().clone()
    }

    /// Recent task events, oldest first.
    pub fn recent_events(&self) -> Vec<RecentEvent> {
        self.shared.recent.lock().snapshot()
    }

    /// Subscriber callbacks that panicked, oldest first.
    pub fn subscriber_faults(&self) -> Vec<SubscriberFault> {
        self.shared.registry.faults()
    }

    /// Counters snapshot.
    pub fn stats(&self) -> ChannelStats {
        self.shared
            .counters
            .snapshot(self.status(), self.connection_id())
    }
}
