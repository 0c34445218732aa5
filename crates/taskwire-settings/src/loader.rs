//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TaskwireSettings::default()`]
//! 2. If `~/.taskwire/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TASKWIRE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TaskwireSettings;

/// Resolve the path to the settings file (`~/.taskwire/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taskwire").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TaskwireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error. The result is
/// validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<TaskwireSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.channel.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<TaskwireSettings> {
    let defaults = serde_json::to_value(TaskwireSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TASKWIRE_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut TaskwireSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// - Integers must parse and fall within the listed range
/// - Strings must be non-empty
/// - Invalid values are ignored with a warning (file/default value stays)
pub fn apply_overrides<F>(settings: &mut TaskwireSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Overrides { lookup };
    let channel = &mut settings.channel;

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.string("TASKWIRE_SERVER_URL") {
        channel.server_url = v;
    }
    if let Some(v) = env.string("TASKWIRE_ENDPOINT_PATH") {
        channel.endpoint_path = v;
    }
    if let Some(v) = env.u64("TASKWIRE_CONNECT_TIMEOUT_MS", 100, 600_000) {
        channel.connect_timeout_ms = v;
    }

    // ── Reconnection ────────────────────────────────────────────────
    if let Some(v) = env.u64("TASKWIRE_BASE_DELAY_MS", 1, 600_000) {
        channel.base_delay_ms = v;
    }
    if let Some(v) = env.u64("TASKWIRE_MAX_DELAY_MS", 1, 3_600_000) {
        channel.max_delay_ms = v;
    }
    if let Some(v) = env.u32("TASKWIRE_MAX_ATTEMPTS", 1, 1000) {
        channel.max_attempts = v;
    }
    if let Some(v) = env.u64("TASKWIRE_JITTER_MS", 0, 60_000) {
        channel.jitter_ms = v;
    }
    if let Some(v) = env.u64("TASKWIRE_RECONNECT_DELAY_MS", 0, 600_000) {
        channel.reconnect_delay_ms = v;
    }

    // ── Heartbeat ───────────────────────────────────────────────────
    if let Some(v) = env.u64("TASKWIRE_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        channel.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u32("TASKWIRE_MAX_MISSED_HEARTBEATS", 1, 100) {
        channel.max_missed_heartbeats = v;
    }

    // ── Buffers ─────────────────────────────────────────────────────
    if let Some(v) = env.usize("TASKWIRE_RECENT_EVENTS", 1, 10_000) {
        channel.recent_events_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TASKWIRE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("TASKWIRE_LOG_FORMAT") {
        match serde_json::from_value(Value::String(v.clone())) {
            Ok(format) => settings.logging.format = format,
            Err(_) => {
                warn!(key = "TASKWIRE_LOG_FORMAT", value = %v, "invalid log format, ignoring");
            }
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Override readers (thin wrappers) ────────────────────────────────────────

struct Overrides<F> {
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, |v| parse_u32_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, |v| parse_usize_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
