//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default ceiling for a single decoded message (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 << 10;

/// Default number of pending outbound messages per connection.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 10;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-connection limits and queueing.
    pub connection: ConnectionConfig,

    /// Accept loop error recovery.
    pub accept: AcceptConfig,

    /// Background eviction of closed connections.
    pub reaper: ReaperConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7000".to_string(),
        }
    }
}

/// What `Connection::send` does when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueFullPolicy {
    /// Wait until the outbound pump frees a slot.
    #[default]
    Block,
    /// Fail immediately with `SendError::QueueFull`.
    Reject,
}

/// Per-connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Largest message the protocol may decode, in bytes.
    pub max_message_size: usize,

    /// Idle read timeout in milliseconds (0 = disabled).
    pub read_timeout_ms: u64,

    /// Capacity of the bounded outbound queue.
    pub outbound_queue_capacity: usize,

    /// Behaviour of `send` on a full outbound queue.
    pub queue_full_policy: QueueFullPolicy,

    /// Upper bound for flushing queued messages once a connection closes.
    pub drain_timeout_ms: u64,
}

impl ConnectionConfig {
    /// Idle read timeout, `None` when disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout_ms: 0,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            queue_full_policy: QueueFullPolicy::Block,
            drain_timeout_ms: 1000,
        }
    }
}

/// Accept loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcceptConfig {
    /// First delay after a transient accept error, in milliseconds.
    pub backoff_base_ms: u64,

    /// Ceiling for the doubling backoff, in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for AcceptConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 5,
            backoff_max_ms: 1000,
        }
    }
}

/// Reaper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Scan interval in milliseconds.
    pub interval_ms: u64,
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self { interval_ms: 10 }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogTarget {
    #[default]
    Stdout,
    Stderr,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty or JSON log lines.
    pub log_format: LogFormat,

    /// Where log lines are written.
    pub log_target: LogTarget,

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
            log_target: LogTarget::Stdout,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
