//! Errors raised while loading `~/.taskwire/settings.json`.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON.
    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Parser failure with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged layers do not fit the settings schema, e.g. a string
    /// where a number of milliseconds belongs.
    #[error("settings have the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value failed [`ChannelSettings::validate`](crate::ChannelSettings::validate).
    #[error("invalid setting: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
