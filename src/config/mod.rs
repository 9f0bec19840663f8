//! Configuration loading.
//!
//! Values come from built-in defaults, an optional config file and
//! `NTFY_BRIDGE_*` environment variables, later sources overriding earlier ones.
//! Nested keys use a double underscore, e.g. `NTFY_BRIDGE_LISTENER__MAX_BACKOFF_MS`.

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BridgeSettings, ListenerSettings, LoggingSettings, Settings, StorageSettings,
};

/// Default location of the optional config file, without extension.
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Loads the configuration from `config/default.*` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from the file at `path` (any format the `config`
/// crate understands, extension optional) and the environment, then merges
/// the result over the defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("NTFY_BRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        storage: StorageSettings {
            path: partial
                .storage
                .as_ref()
                .and_then(|s| s.path.clone())
                .unwrap_or(default.storage.path),
        },
        listener: ListenerSettings {
            secure: partial
                .listener
                .as_ref()
                .and_then(|l| l.secure)
                .unwrap_or(default.listener.secure),
            connect_timeout_secs: partial
                .listener
                .as_ref()
                .and_then(|l| l.connect_timeout_secs)
                .unwrap_or(default.listener.connect_timeout_secs),
            initial_backoff_ms: partial
                .listener
                .as_ref()
                .and_then(|l| l.initial_backoff_ms)
                .unwrap_or(default.listener.initial_backoff_ms),
            max_backoff_ms: partial
                .listener
                .as_ref()
                .and_then(|l| l.max_backoff_ms)
                .unwrap_or(default.listener.max_backoff_ms),
            idle_timeout_secs: partial
                .listener
                .as_ref()
                .and_then(|l| l.idle_timeout_secs)
                .unwrap_or(default.listener.idle_timeout_secs),
            close_timeout_ms: partial
                .listener
                .as_ref()
                .and_then(|l| l.close_timeout_ms)
                .unwrap_or(default.listener.close_timeout_ms),
        },
        bridge: BridgeSettings {
            command_prefix: partial
                .bridge
                .as_ref()
                .and_then(|b| b.command_prefix.clone())
                .unwrap_or(default.bridge.command_prefix),
            subscribe_ack_ms: partial
                .bridge
                .as_ref()
                .and_then(|b| b.subscribe_ack_ms)
                .unwrap_or(default.bridge.subscribe_ack_ms),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}
