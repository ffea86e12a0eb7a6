//! Error types surfaced by the server and by connection handles.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::validation::{format_errors, ValidationError};

/// Error type for server operations.
///
/// Per-connection I/O failures never show up here; they close the affected
/// connection and reach the application through `EventHandler::on_close`.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bind or dial address could not be resolved.
    #[error("failed to resolve {address}: {source}")]
    Resolution {
        address: String,
        source: std::io::Error,
    },

    /// The listening socket could not be opened.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },

    /// A non-transient accept failure ended the accept loop.
    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// Dialing a remote address failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// The shutdown signal fired. This is the expected way for `serve` to end.
    #[error("server closed")]
    Closed,

    /// `serve` was called while another accept loop is running.
    #[error("server is already serving")]
    AlreadyServing,

    /// The accept loop panicked and was stopped.
    #[error("accept loop panicked: {0}")]
    Panicked(String),

    /// The configuration failed validation.
    #[error("invalid configuration: {}", format_errors(.0))]
    Config(Vec<ValidationError>),
}

impl ServerError {
    /// Returns true when the server stopped because it was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, ServerError::Closed)
    }
}

/// Error returned when a message cannot be enqueued on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection is closing or closed.
    #[error("connection closed")]
    Closed,

    /// The outbound queue is full and the connection rejects instead of waiting.
    #[error("outbound queue full")]
    QueueFull,
}
