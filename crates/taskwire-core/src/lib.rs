//! # taskwire-core
//!
//! Foundation types shared by the taskwire crates.
//!
//! - **Status**: [`ConnectionStatus`] and the attempt-aware [`StatusChange`]
//! - **Envelope**: [`envelope::Inbound`] decoding into a closed [`envelope::MessageKind`]
//!   set, plus outbound [`envelope::ClientMessage`] constructors
//! - **Errors**: [`errors::ChannelError`] and [`errors::EnvelopeError`] via `thiserror`
//! - **Retry**: exponential backoff with additive jitter
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod logging;
pub mod retry;
pub mod status;

pub use envelope::{ANY_EVENT, ClientMessage, Inbound, MessageKind};
pub use errors::{ChannelError, EnvelopeError};
pub use status::{ConnectionStatus, StatusChange};
