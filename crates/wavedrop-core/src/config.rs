//! Configuration management for Wavedrop.
//!
//! Loaded from `config.toml` in the platform configuration directory;
//! every field falls back to a protocol default, so a missing or partial
//! file is fine.
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/wavedrop/config.toml` |
//! | macOS | `~/Library/Application Support/Wavedrop/config.toml` |
//! | Windows | `%APPDATA%\Wavedrop\config.toml` |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Wavedrop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay settings
    pub relay: RelayConfig,
    /// Transfer settings
    pub transfer: TransferSettings,
    /// Session settings
    pub session: SessionSettings,
    /// NAT traversal servers
    pub ice: IceConfig,
}

/// Relay endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the relay
    pub url: String,
    /// Bind address when running the relay locally
    pub bind: String,
    /// Bearer secret protecting the cleanup endpoint
    pub cleanup_secret: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: format!("http://127.0.0.1:{}", crate::DEFAULT_RELAY_PORT),
            bind: format!("127.0.0.1:{}", crate::DEFAULT_RELAY_PORT),
            cleanup_secret: None,
        }
    }
}

/// Transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Bytes per chunk
    pub chunk_size: usize,
    /// Backpressure threshold in queued bytes
    pub buffer_threshold: u64,
    /// Largest file to offer, in bytes
    pub max_file_size: u64,
    /// Seconds the receiver waits for completion
    pub completion_timeout_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: crate::CHUNK_SIZE,
            buffer_threshold: crate::BUFFER_THRESHOLD,
            max_file_size: crate::DEFAULT_MAX_FILE_SIZE,
            completion_timeout_secs: crate::COMPLETION_TIMEOUT_SECS,
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seconds a share token stays valid
    pub expiry_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiry_secs: crate::DEFAULT_TOKEN_EXPIRY_SECS,
        }
    }
}

/// STUN and TURN servers used for connection setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// STUN server URLs
    pub stun: Vec<String>,
    /// Optional TURN relay
    pub turn: Option<TurnServer>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun: vec!["stun:stun.l.google.com:19302".to_string()],
            turn: None,
        }
    }
}

/// A TURN server with credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    /// Server URL (`turn:` scheme)
    pub url: String,
    /// Username
    pub username: String,
    /// Credential
    pub credential: String,
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigError(format!("Failed to create config directory: {e}")))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "wavedrop", "Wavedrop")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.transfer.chunk_size, crate::CHUNK_SIZE);
        assert_eq!(config.transfer.buffer_threshold, crate::BUFFER_THRESHOLD);
        assert_eq!(config.session.expiry_secs, crate::DEFAULT_TOKEN_EXPIRY_SECS);
        assert_eq!(config.ice.stun.len(), 1);
        assert!(config.ice.turn.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [relay]
            url = "https://relay.example.net"

            [transfer]
            chunk_size = 16384
            "#,
        )
        .expect("parse");
        assert_eq!(config.relay.url, "https://relay.example.net");
        assert_eq!(config.transfer.chunk_size, 16_384);
        assert_eq!(config.transfer.buffer_threshold, crate::BUFFER_THRESHOLD);
        assert_eq!(config.session.expiry_secs, crate::DEFAULT_TOKEN_EXPIRY_SECS);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.transfer.chunk_size, config.transfer.chunk_size);
        assert_eq!(parsed.relay.url, config.relay.url);
    }
}
