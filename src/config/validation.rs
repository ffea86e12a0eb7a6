//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject values the runtime cannot work with (zero capacities, zero intervals)
//! - Check the backoff window is well-formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ServerConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener bind address is empty")]
    EmptyBindAddress,

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("accept.backoff_max_ms ({max}) is below accept.backoff_base_ms ({base})")]
    BackoffWindow { base: u64, max: u64 },

    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::EmptyBindAddress);
    }

    let conn = &config.connection;
    if conn.max_message_size == 0 {
        errors.push(ValidationError::ZeroValue("connection.max_message_size"));
    }
    if conn.outbound_queue_capacity == 0 {
        errors.push(ValidationError::ZeroValue("connection.outbound_queue_capacity"));
    }
    // Zero would drop every queued message on close.
    if conn.drain_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("connection.drain_timeout_ms"));
    }

    if config.accept.backoff_base_ms == 0 {
        errors.push(ValidationError::ZeroValue("accept.backoff_base_ms"));
    } else if config.accept.backoff_max_ms < config.accept.backoff_base_ms {
        errors.push(ValidationError::BackoffWindow {
            base: config.accept.backoff_base_ms,
            max: config.accept.backoff_max_ms,
        });
    }

    if config.reaper.interval_ms == 0 {
        errors.push(ValidationError::ZeroValue("reaper.interval_ms"));
    }

    // Bare levels are checked here; richer filter directives are left to EnvFilter.
    let level = config.observability.log_level.trim();
    if !level.contains(['=', ',']) && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(level.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Join validation errors into one line.
pub fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
