//! Bridge configuration file handling.
//!
//! Configuration is TOML, stored in the platform data directory by default.
//! Environment variables override file values so container deployments can
//! skip the file entirely.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Operator configuration for one bridge instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Durable storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend websocket URL (e.g. ws://localhost:1989). Required; also
    /// settable via BRIDGE_SERVER.
    pub server_url: Option<String>,

    /// Free-form settings forwarded verbatim in the session handshake.
    pub bot_config: Option<toml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database URL for the credential store
    pub database_url: Option<String>,

    /// File the persistent session id lives in
    pub session_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: BridgeConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Apply environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Ok(server) = std::env::var("BRIDGE_SERVER") {
            if !server.is_empty() {
                self.backend.server_url = Some(server);
            }
        }
        if let Ok(url) = std::env::var("BRIDGE_STORAGE_URL") {
            if !url.is_empty() {
                self.storage.database_url = Some(url);
            }
        }
    }

    /// Backend URL, or the startup error the operator needs to see.
    pub fn require_server_url(&self) -> Result<String, Box<dyn std::error::Error>> {
        match self.backend.server_url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Err("No backend server configured. Set backend.server_url in the \
                      config file or the BRIDGE_SERVER environment variable."
                .into()),
        }
    }

    pub fn database_url(&self) -> String {
        self.storage
            .database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}?mode=rwc", default_database_path().display()))
    }

    pub fn session_file(&self) -> PathBuf {
        self.storage
            .session_file
            .clone()
            .unwrap_or_else(default_session_path)
    }
}

/// Data directory for bridge state (~/.local/share/wabridge on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wabridge")
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

pub fn default_database_path() -> PathBuf {
    default_data_dir().join("auth.db")
}

pub fn default_session_path() -> PathBuf {
    default_data_dir().join("session-id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = BridgeConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let back: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert!(back.backend.server_url.is_none());
        assert_eq!(back.logging.level, "info");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [backend]
            server_url = "ws://localhost:1989"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.backend.server_url.as_deref(),
            Some("ws://localhost:1989")
        );
        assert_eq!(config.logging.level, "info");
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn bot_config_passes_through() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [backend]
            server_url = "ws://localhost:1989"
            [backend.bot_config]
            owner = "100001"
            "#,
        )
        .unwrap();

        let value = serde_json::to_value(config.backend.bot_config.unwrap()).unwrap();
        assert_eq!(value["owner"], "100001");
    }

    #[test]
    fn missing_server_url_is_a_startup_error() {
        let config = BridgeConfig::default();
        assert!(config.require_server_url().is_err());

        let mut config = BridgeConfig::default();
        config.backend.server_url = Some(String::new());
        assert!(config.require_server_url().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = BridgeConfig::default();
        config.backend.server_url = Some("ws://backend:1989".to_string());
        config.save(&path).unwrap();

        let back = BridgeConfig::load(&path).unwrap();
        assert_eq!(back.backend.server_url.as_deref(), Some("ws://backend:1989"));
    }
}
