//! # taskwire-settings
//!
//! Layered configuration for the taskwire channel.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TaskwireSettings::default()`]
//! 2. **User file**: `~/.taskwire/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TASKWIRE_*` overrides (highest priority)
//!
//! There is no global instance; callers load settings once and hand the
//! [`ChannelSettings`] to the channel they construct.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{ChannelSettings, LoggingSettings, TaskwireSettings};
