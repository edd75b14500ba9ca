//! # Configuration Management
//!
//! Centralized configuration for the packet transport core.
//!
//! This module provides the protocol constants shared by every peer and
//! structured configuration for servers and clients, including connection
//! limits, handshake deadlines, security mode, and logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `from_env()`
//!
//! ## Security Considerations
//! - `MAX_BODY_SIZE` is enforced before any allocation driven by a
//!   peer-supplied length field
//! - The handshake deadline prevents half-open sockets from pinning resources

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Length of X25519 public/private keys and derived session keys, in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the handshake challenge, in bytes. Must be a multiple of the
/// 8-byte scramble block.
pub const CHALLENGE_LEN: usize = 32;

/// Length of the fixed handshake blob: `[public_key][challenge]`.
pub const HANDSHAKE_LEN: usize = KEY_LEN + CHALLENGE_LEN;

/// Length of the per-packet XChaCha20-Poly1305 nonce carried in the header.
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 authentication tag appended by encryption.
pub const TAG_LEN: usize = 16;

/// Serialized packet header size on the wire: `[id: 4][size: 4][nonce: 24]`.
pub const HEADER_LEN: usize = 4 + 4 + NONCE_LEN;

/// Max allowed packet body size (1 MiB). A peer-supplied `size` field above
/// this bound is rejected before any buffer is reserved.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default deadline for completing the handshake exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How packet bodies are protected once the handshake completes.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SecurityMode {
    /// Per-connection session keys derived from the X25519 key exchange
    /// performed during the handshake (default).
    #[default]
    KeyExchange,
    /// A single symmetric key derived from a shared password. Both peers must
    /// be configured with the same password.
    Password { password: String },
}

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GAMEWIRE_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(max) = std::env::var("GAMEWIRE_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        if let Ok(timeout) = std::env::var("GAMEWIRE_HANDSHAKE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                let deadline = Duration::from_millis(val);
                config.server.handshake_timeout = deadline;
                config.client.handshake_timeout = deadline;
            }
        }

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server listen address (e.g., "0.0.0.0:60000")
    pub address: String,

    /// Maximum number of concurrent validated connections
    pub max_connections: usize,

    /// Deadline for a newly accepted socket to complete the handshake
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Security mode shared by every connection this server accepts
    #[serde(default)]
    pub security: SecurityMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0:60000"),
            max_connections: 256,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            security: SecurityMode::default(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:60000')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors.extend(validate_handshake_timeout(self.handshake_timeout));
        errors.extend(validate_security(&self.security));

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Deadline for the handshake exchange after TCP connect
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Security mode; must match the server's
    #[serde(default)]
    pub security: SecurityMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            security: SecurityMode::default(),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(validate_handshake_timeout(self.handshake_timeout));
        errors.extend(validate_security(&self.security));
        errors
    }
}

fn validate_handshake_timeout(timeout: Duration) -> Vec<String> {
    let mut errors = Vec::new();
    if timeout.as_millis() < 100 {
        errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
    } else if timeout.as_secs() > 300 {
        errors.push("Handshake timeout too long (maximum: 300s)".to_string());
    }
    errors
}

fn validate_security(security: &SecurityMode) -> Vec<String> {
    let mut errors = Vec::new();
    if let SecurityMode::Password { password } = security {
        if password.is_empty() {
            errors.push("Password security mode requires a non-empty password".to_string());
        } else if password.len() < 8 {
            errors.push("Password too short (minimum: 8 characters)".to_string());
        }
    }
    errors
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gamewire"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
