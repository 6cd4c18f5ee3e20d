//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the enhanced HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, server name).
    pub listener: ListenerConfig,

    /// Connection registry limits and timeouts.
    pub connections: ConnectionConfig,

    /// Response compression settings.
    pub compression: CompressionConfig,

    /// Request validation limits.
    pub security: SecurityConfig,

    /// Multipart upload limits.
    pub upload: UploadConfig,

    /// Server-side session settings.
    pub sessions: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Value written in the `Server` response header.
    pub server_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            server_name: "enhanced-http".to_string(),
        }
    }
}

/// Connection tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Maximum concurrently registered connections.
    pub max_connections: usize,

    /// Idle time after which a connection is evicted, in milliseconds.
    pub keep_alive_timeout_ms: u64,

    /// Maximum time to wait for a request on an open connection, in milliseconds.
    pub connection_timeout_ms: u64,

    /// Interval between idle-connection sweeps, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl ConnectionConfig {
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            keep_alive_timeout_ms: 30_000,
            connection_timeout_ms: 60_000,
            sweep_interval_ms: 5_000,
        }
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable compression of buffered responses.
    pub enabled: bool,

    /// Bodies must be strictly larger than this many bytes to be compressed.
    pub threshold: usize,

    /// Value written in `Content-Encoding`.
    pub encoding: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1024,
            encoding: "gzip".to_string(),
        }
    }
}

/// Request validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Run the request validator before dispatch.
    pub enabled: bool,
    /// Maximum URI length in bytes.
    pub max_uri_length: usize,
    /// Maximum number of header fields.
    pub max_header_count: usize,
    /// Maximum declared body size in bytes.
    pub max_body_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_uri_length: 2048,
            max_header_count: 100,
            max_body_size: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

/// Multipart upload configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum size of a single file part in bytes.
    pub max_file_size: u64,
    /// Maximum number of parts in one request.
    pub max_file_count: usize,
    /// Directory uploaded files are written to. Defaults to the OS temp dir.
    pub directory: Option<PathBuf>,
}

impl UploadConfig {
    /// Upper bound on the combined size of all file parts.
    pub fn max_total_size(&self) -> u64 {
        self.max_file_size.saturating_mul(self.max_file_count as u64)
    }

    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100 MiB
            max_file_count: 10,
            directory: None,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is swept, in seconds.
    pub timeout_secs: u64,
    /// Interval between session sweeps, in seconds.
    pub sweep_interval_secs: u64,
    /// Cookie carrying the session id.
    pub cookie_name: String,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            sweep_interval_secs: 60,
            cookie_name: "SESSIONID".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics recording and the exporter endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
