//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Accepted ranges, shared by the file and env layers.
const PORT_RANGE: (u16, u16) = (1, 65535);
const MAX_BODY_RANGE: (u64, u64) = (1024, 256 * 1024 * 1024);
const BACKEND_TIMEOUT_RANGE: (u64, u64) = (100, 600_000);
const QUEUE_CAPACITY_RANGE: (u64, u64) = (1, 65_536);
const WRITE_TIMEOUT_RANGE: (u64, u64) = (10, 600_000);
const HEARTBEAT_RANGE: (u64, u64) = (100, 600_000);
const CLIENT_TIMEOUT_RANGE: (u64, u64) = (100, 3_600_000);

/// Env var naming an optional JSON settings file.
pub const SETTINGS_PATH_ENV: &str = "RELAY_SETTINGS_PATH";

/// Load settings: defaults, then the file at `RELAY_SETTINGS_PATH` if set,
/// then environment overrides.
pub fn load_settings() -> Result<RelaySettings> {
    match read_env_string(SETTINGS_PATH_ENV) {
        Some(path) => load_settings_from_path(Path::new(&path)),
        None => {
            let mut settings = RelaySettings::default();
            apply_env_overrides(&mut settings);
            Ok(settings)
        }
    }
}

/// Load settings from a specific file with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    clamp_ranges(&mut settings);
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (fall back to file/default).
fn apply_overrides_from(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u16("PORT", PORT_RANGE.0, PORT_RANGE.1) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("RELAY_STATIC_DIR") {
        settings.server.static_dir = v;
    }
    if let Some(v) = env.u64("RELAY_MAX_BODY_BYTES", MAX_BODY_RANGE.0, MAX_BODY_RANGE.1) {
        settings.server.max_body_bytes = usize::try_from(v).unwrap_or(settings.server.max_body_bytes);
    }

    // ── Backend ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PROJECT_UID") {
        settings.backend.project_uid = v;
    }
    if let Some(v) = env.string("API_TOKEN") {
        settings.backend.api_token = v;
    }
    if let Some(v) = env.string("NOTEHUB_API_URL") {
        settings.backend.base_url = v;
    }
    if let Some(v) = env.u64("RELAY_BACKEND_TIMEOUT_MS", BACKEND_TIMEOUT_RANGE.0, BACKEND_TIMEOUT_RANGE.1) {
        settings.backend.timeout_ms = v;
    }

    // ── Subscribers ─────────────────────────────────────────────────
    if let Some(v) = env.u64("RELAY_QUEUE_CAPACITY", QUEUE_CAPACITY_RANGE.0, QUEUE_CAPACITY_RANGE.1) {
        settings.subscribers.queue_capacity = usize::try_from(v).unwrap_or(settings.subscribers.queue_capacity);
    }
    if let Some(v) = env.u64("RELAY_WRITE_TIMEOUT_MS", WRITE_TIMEOUT_RANGE.0, WRITE_TIMEOUT_RANGE.1) {
        settings.subscribers.write_timeout_ms = v;
    }
    if let Some(v) = env.u64("RELAY_HEARTBEAT_INTERVAL_MS", HEARTBEAT_RANGE.0, HEARTBEAT_RANGE.1) {
        settings.subscribers.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("RELAY_CLIENT_TIMEOUT_MS", CLIENT_TIMEOUT_RANGE.0, CLIENT_TIMEOUT_RANGE.1) {
        settings.subscribers.client_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("RELAY_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Pull file-provided numeric settings into the ranges the env layer accepts.
/// Port is left alone (0 asks the OS for one).
///
/// Out-of-range values are clamped to the nearest bound with a warning.
fn clamp_ranges(settings: &mut RelaySettings) {
    settings.server.max_body_bytes = clamp_usize("server.maxBodyBytes", settings.server.max_body_bytes, MAX_BODY_RANGE);
    settings.backend.timeout_ms = clamp_u64("backend.timeoutMs", settings.backend.timeout_ms, BACKEND_TIMEOUT_RANGE);

    let subs = &mut settings.subscribers;
    subs.queue_capacity = clamp_usize("subscribers.queueCapacity", subs.queue_capacity, QUEUE_CAPACITY_RANGE);
    subs.write_timeout_ms = clamp_u64("subscribers.writeTimeoutMs", subs.write_timeout_ms, WRITE_TIMEOUT_RANGE);
    subs.heartbeat_interval_ms = clamp_u64("subscribers.heartbeatIntervalMs", subs.heartbeat_interval_ms, HEARTBEAT_RANGE);
    subs.client_timeout_ms = clamp_u64("subscribers.clientTimeoutMs", subs.client_timeout_ms, CLIENT_TIMEOUT_RANGE);
}

fn clamp_u64(key: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(key, value, clamped, "setting out of range, clamping");
    }
    clamped
}

fn clamp_usize(key: &str, value: usize, range: (u64, u64)) -> usize {
    let wide = u64::try_from(value).unwrap_or(u64::MAX);
    usize::try_from(clamp_u64(key, wide, range)).unwrap_or(value)
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
