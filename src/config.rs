//! # Configuration Management
//!
//! Centralized configuration for the ARN server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! Every section validates itself; `NetworkConfig::validate()` collects all
//! problems instead of stopping at the first.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current supported protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Default TCP listen address
pub const DEFAULT_TCP_ADDRESS: &str = "0.0.0.0:7777";

/// Default UDP bind address
pub const DEFAULT_UDP_ADDRESS: &str = "0.0.0.0:7778";

/// Max allowed payload size accepted from the network (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest datagram the UDP socket will read
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Default cap on concurrently running connection/datagram tasks
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
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

        if let Ok(addr) = std::env::var("ARN_TCP_ADDRESS") {
            config.server.tcp_address = addr;
        }

        if let Ok(addr) = std::env::var("ARN_UDP_ADDRESS") {
            config.server.udp_address = addr;
        }

        if let Ok(timeout) = std::env::var("ARN_READ_TIMEOUT_MS") {
            let val = timeout.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid ARN_READ_TIMEOUT_MS '{timeout}': {e}"))
            })?;
            config.server.read_timeout = Duration::from_millis(val);
        }

        if let Ok(limit) = std::env::var("ARN_MAX_CONCURRENT_TASKS") {
            config.server.max_concurrent_tasks = limit.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid ARN_MAX_CONCURRENT_TASKS '{limit}': {e}"))
            })?;
        }

        if let Ok(size) = std::env::var("ARN_MAX_PAYLOAD_SIZE") {
            config.transport.max_payload_size = size.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid ARN_MAX_PAYLOAD_SIZE '{size}': {e}"))
            })?;
        }

        if let Ok(level) = std::env::var("ARN_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid ARN_LOG_LEVEL '{level}'"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
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
    /// TCP listen address (e.g., "0.0.0.0:7777")
    pub tcp_address: String,

    /// UDP bind address (e.g., "0.0.0.0:7778")
    pub udp_address: String,

    /// Inactivity deadline applied to each TCP read and write
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Maximum number of connection/datagram tasks running at once
    pub max_concurrent_tasks: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_address: String::from(DEFAULT_TCP_ADDRESS),
            udp_address: String::from(DEFAULT_UDP_ADDRESS),
            read_timeout: timeout::READ_TIMEOUT,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (label, address) in [("TCP", &self.tcp_address), ("UDP", &self.udp_address)] {
            if address.is_empty() {
                errors.push(format!("{label} address cannot be empty"));
            } else if address.parse::<std::net::SocketAddr>().is_err() {
                errors.push(format!(
                    "Invalid {label} address format: '{address}' (expected format: '0.0.0.0:7777')"
                ));
            }
        }

        if self.read_timeout.as_millis() < 10 {
            errors.push("Read timeout too short (minimum: 10ms)".to_string());
        } else if self.read_timeout.as_secs() > 300 {
            errors.push("Read timeout too long (maximum: 300s)".to_string());
        }

        if self.max_concurrent_tasks == 0 {
            errors.push("Max concurrent tasks must be greater than 0".to_string());
        } else if self.max_concurrent_tasks > 100_000 {
            errors.push(format!(
                "Max concurrent tasks very high: {} (ensure system resources can support this)",
                self.max_concurrent_tasks
            ));
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum payload size accepted over TCP, in bytes
    pub max_payload_size: usize,

    /// Receive buffer size for the UDP socket, in bytes
    pub max_datagram_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size > u32::MAX as usize {
            errors.push(format!(
                "Max payload size too large: {} bytes (length prefix is 32 bits)",
                self.max_payload_size
            ));
        }

        if self.max_datagram_size < crate::core::message::MIN_MESSAGE_SIZE {
            errors.push(format!(
                "Max datagram size too small: {} bytes (minimum: {})",
                self.max_datagram_size,
                crate::core::message::MIN_MESSAGE_SIZE
            ));
        } else if self.max_datagram_size > MAX_DATAGRAM_SIZE {
            errors.push(format!(
                "Max datagram size too large: {} bytes (maximum: {MAX_DATAGRAM_SIZE})",
                self.max_datagram_size
            ));
        }

        errors
    }
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
            app_name: String::from("arn-server"),
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
        let level_str = level.as_str().to_ascii_lowercase();
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
