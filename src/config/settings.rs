use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration for the bridge.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    pub listener: ListenerSettings,
    pub bridge: BridgeSettings,
    pub logging: LoggingSettings,
}

/// Where the subscription database lives.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub path: String,
}

/// Connection and reconnect policy for topic listeners.
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerSettings {
    /// `wss` when true, plain `ws` otherwise.
    pub secure: bool,
    pub connect_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Reconnect when nothing arrives for this long. 0 disables the watchdog.
    pub idle_timeout_secs: u64,
    pub close_timeout_ms: u64,
}

impl ListenerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Command handling settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeSettings {
    /// Commands look like `!<command_prefix> subscribe ntfy.sh/alerts`.
    pub command_prefix: String,
    /// How long a subscribe waits for the first connection attempt.
    pub subscribe_ack_ms: u64,
}

impl BridgeSettings {
    pub fn subscribe_ack(&self) -> Duration {
        Duration::from_millis(self.subscribe_ack_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub storage: Option<PartialStorageSettings>,
    pub listener: Option<PartialListenerSettings>,
    pub bridge: Option<PartialBridgeSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialListenerSettings {
    pub secure: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub close_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBridgeSettings {
    pub command_prefix: Option<String>,
    pub subscribe_ack_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            secure: true,
            connect_timeout_secs: 30,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            idle_timeout_secs: 180,
            close_timeout_ms: 5_000,
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            command_prefix: "ntfy".to_string(),
            subscribe_ack_ms: 5_000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageSettings {
                path: "ntfy_bridge_db".to_string(),
            },
            listener: ListenerSettings::default(),
            bridge: BridgeSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
