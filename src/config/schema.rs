//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! streaming server and the relay. All types derive Serde traits for
//! deserialization from config files, and every section has defaults so an
//! empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration for the streaming server.
    pub listener: ListenerConfig,

    /// Streaming endpoint settings.
    pub streaming: StreamingConfig,

    /// Relay (reverse proxy) settings.
    pub relay: RelayConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Which HTTP adapter serves the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// axum router with the tower-http middleware stack.
    Axum,
    /// Bare hyper service on hyper-util's connection builder.
    Hyper,
}

/// Streaming endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Path the stream is served on.
    pub path: String,

    /// Adapter used by `serve` when none is given on the command line.
    pub adapter: AdapterKind,

    /// Mirror every record as a debug log event.
    pub mirror_records: bool,

    /// Compress non-stream responses (the stream itself is never compressed).
    pub compression: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            path: "/ping".to_string(),
            adapter: AdapterKind::Axum,
            mirror_records: false,
            compression: true,
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay bind address.
    pub bind_address: String,

    /// Upstream base URL (scheme and authority).
    pub upstream: String,

    /// Path prefix relayed to the upstream. Empty relays everything.
    pub prefix: String,

    /// Remove the prefix before forwarding.
    pub strip_prefix: bool,

    /// Response compression.
    pub compression: RelayCompressionConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            upstream: "http://127.0.0.1:8000".to_string(),
            prefix: "/api".to_string(),
            strip_prefix: true,
            compression: RelayCompressionConfig::default(),
        }
    }
}

/// Relay response compression.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayCompressionConfig {
    /// Enable gzip for relayed responses.
    pub enabled: bool,

    /// Path prefixes whose responses are never compressed.
    pub skip_prefixes: Vec<String>,
}

impl Default for RelayCompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_prefixes: vec!["/api".to_string()],
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed to produce a response head, in seconds.
    /// Streaming bodies are not bounded by it.
    pub request_secs: u64,

    /// How long graceful shutdown waits for open connections.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
