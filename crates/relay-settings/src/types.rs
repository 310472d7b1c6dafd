//! Settings types with compiled defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Notehub backend used by the proxy endpoints.
    pub backend: BackendSettings,
    /// Per-subscriber delivery tuning.
    pub subscribers: SubscriberSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Directory holding the viewer pages and their assets.
    pub static_dir: String,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: "public".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Notehub API connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// API base URL.
    pub base_url: String,
    /// Project UID the devices and fleets belong to.
    pub project_uid: String,
    /// Bearer token sent on every backend call.
    #[serde(skip_serializing)]
    pub api_token: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.notehub.io".to_string(),
            project_uid: String::new(),
            api_token: String::new(),
            timeout_ms: 10_000,
        }
    }
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Delivery tuning for push-channel subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriberSettings {
    /// Envelopes buffered per subscriber before it is considered stuck.
    pub queue_capacity: usize,
    /// Upper bound on a single socket write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Drop a subscriber that has not answered a ping for this long.
    pub client_timeout_ms: u64,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            write_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            client_timeout_ms: 90_000,
        }
    }
}

impl SubscriberSettings {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }
}

/// Log output settings. `RUST_LOG` takes precedence over `level`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `relay_server=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
