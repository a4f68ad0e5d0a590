//! # Configuration
//!
//! Centralized limits and settings for the codec and transports.
//!
//! The decode-side limits exist to bound resource usage against adversarial
//! input: every declared length is validated against these caps before any
//! proportional allocation happens, and recursion depth is capped so nested
//! structures cannot exhaust the stack.
//!
//! ## Sources
//! - TOML files via [`RpcConfig::from_file`]
//! - Environment overrides via [`RpcConfig::from_env`]
//! - Direct instantiation with defaults

use crate::error::{Error, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Default cap for a single frame (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default cap for one string/binary field.
pub const MAX_STRING_SIZE: usize = 16 * 1024 * 1024;

/// Default cap on declared container element counts.
pub const MAX_CONTAINER_SIZE: usize = 1024 * 1024;

/// Default recursion depth for nested structs/containers.
pub const MAX_RECURSION_DEPTH: usize = 64;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RpcConfig {
    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Protocol(ProtocolError::InvalidData(format!(
                "failed to read config file: {e}"
            )))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content).map_err(|e| {
            Error::Protocol(ProtocolError::InvalidData(format!(
                "failed to parse TOML: {e}"
            )))
        })
    }

    /// Defaults overridden by `WIRE_RPC_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("WIRE_RPC_MAX_FRAME_SIZE") {
            if let Ok(val) = v.parse::<usize>() {
                config.transport.max_frame_size = val;
            }
        }
        if let Ok(v) = std::env::var("WIRE_RPC_MAX_STRING_SIZE") {
            if let Ok(val) = v.parse::<usize>() {
                config.codec.max_string_size = val;
            }
        }
        if let Ok(v) = std::env::var("WIRE_RPC_MAX_CONTAINER_SIZE") {
            if let Ok(val) = v.parse::<usize>() {
                config.codec.max_container_size = val;
            }
        }
        if let Ok(v) = std::env::var("WIRE_RPC_MAX_RECURSION_DEPTH") {
            if let Ok(val) = v.parse::<usize>() {
                config.codec.max_recursion_depth = val;
            }
        }
        if let Ok(v) = std::env::var("WIRE_RPC_LOG_LEVEL") {
            if let Ok(level) = v.parse::<Level>() {
                config.logging.log_level = level;
            }
        }

        config
    }

    /// Collect validation findings. Empty means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.codec.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// [`validate`](Self::validate) as a hard failure.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Protocol(ProtocolError::InvalidData(format!(
                "configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            ))))
        }
    }
}

/// Codec behavior and decode-side limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Require the strict version word when reading message headers.
    pub strict_read: bool,

    /// Emit the strict version word when writing message headers.
    pub strict_write: bool,

    /// Maximum bytes in one string/binary field.
    pub max_string_size: usize,

    /// Maximum declared element count in one container.
    pub max_container_size: usize,

    /// Maximum nesting depth for structs and containers.
    pub max_recursion_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            strict_read: true,
            strict_write: true,
            max_string_size: MAX_STRING_SIZE,
            max_container_size: MAX_CONTAINER_SIZE,
            max_recursion_depth: MAX_RECURSION_DEPTH,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_string_size == 0 {
            errors.push("max_string_size cannot be 0".to_string());
        }
        if self.max_container_size == 0 {
            errors.push("max_container_size cannot be 0".to_string());
        }
        if self.max_recursion_depth == 0 {
            errors.push("max_recursion_depth cannot be 0".to_string());
        } else if self.max_recursion_depth > 1024 {
            errors.push(format!(
                "max_recursion_depth very high: {} (stack usage grows with depth)",
                self.max_recursion_depth
            ));
        }

        errors
    }
}

/// Framing-layer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum accepted frame payload length.
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size == 0 {
            errors.push("max_frame_size cannot be 0".to_string());
        } else if self.max_frame_size > i32::MAX as usize {
            errors.push(format!(
                "max_frame_size {} exceeds the 4-byte signed frame header range",
                self.max_frame_size
            ));
        }

        errors
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Application name for logs.
    pub app_name: String,

    /// Log level.
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console.
    pub log_to_console: bool,

    /// Whether to log to file.
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("wire-rpc"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("app_name cannot be empty".to_string());
        }

        if self.log_to_file && self.log_file_path.is_none() {
            errors.push("log_file_path must be specified when log_to_file is true".to_string());
        }

        if !self.log_to_console && !self.log_to_file {
            errors.push(
                "at least one logging output (console or file) must be enabled".to_string(),
            );
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization.
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
            .map_err(|_| serde::de::Error::custom(format!("invalid log level: {level_str}")))
    }
}
