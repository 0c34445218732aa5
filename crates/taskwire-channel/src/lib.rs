//! # taskwire-channel
//!
//! Resilient real-time event channel for the task server.
//!
//! - **[`Channel`]**: the consumer facade (connect, disconnect, reconnect,
//!   send, subscribe, status observation)
//! - **Actor**: one task per channel owning the connection state machine
//! - **[`HeartbeatMonitor`]**: unanswered-probe counting while connected
//! - **[`ReconnectState`]**: exponential backoff with jitter and an attempt ceiling
//! - **[`EventRegistry`]**: connection-independent event fan-out with
//!   per-callback panic isolation
//! - **Transport**: [`Connector`] trait with a `tokio-tungstenite` implementation
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskwire_channel::{Channel, SharedToken};
//! use taskwire_settings::ChannelSettings;
//!
//! # async fn run() -> Result<(), taskwire_core::ChannelError> {
//! let token = SharedToken::new("jwt");
//! let channel = Channel::new(ChannelSettings::new("ws://localhost:8000"), Arc::new(token))?;
//! let _status = channel.on_status_change(|change| println!("{}", change.status));
//! let _tasks = channel.subscribe("task_created", |event| println!("{event}"));
//! channel.connect().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod actor;
pub mod channel;
pub mod credentials;
pub mod heartbeat;
pub mod recent;
pub mod reconnect;
pub mod registry;
pub mod stats;
pub mod status;
pub mod subscription;
pub mod transport;

pub use channel::Channel;
pub use credentials::{CredentialProvider, SharedToken};
pub use heartbeat::{HeartbeatMonitor, Liveness};
pub use recent::{RecentEvent, RecentEvents};
pub use reconnect::ReconnectState;
pub use registry::{EventCallback, EventRegistry, SubscriberFault};
pub use stats::ChannelStats;
pub use status::{StatusCallback, StatusHub};
pub use subscription::Subscription;
pub use transport::{CloseReason, Connector, Link, LinkEvent, LinkPeer, NORMAL_CLOSURE, WsConnector};
