//! Wire framing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     socket bytes → read buffer (owned by the inbound pump)
//!     → Protocol::decode (one frame per call, bounded by max_message_size)
//!     → EventHandler::on_message
//!
//! Outbound:
//!     Connection::send → outbound queue
//!     → Protocol::encode → write buffer → socket
//! ```
//!
//! # Design Decisions
//! - The core never looks inside a message; framing is entirely pluggable
//! - Decoding is buffer-driven: `Ok(None)` asks the pump for more bytes
//! - The size ceiling is handed to every decode call and backstopped by the pump

pub mod length_prefixed;
pub mod line;

use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;

pub use length_prefixed::LengthPrefixed;
pub use line::LineDelimited;

/// Framing errors. Any of these closes the connection that produced it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame declared or accumulated more bytes than the configured ceiling.
    #[error("frame of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// The bytes on the wire do not form a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The underlying stream failed.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a byte stream into discrete messages and messages back into bytes.
///
/// Implementations are shared between connections, so any per-stream state
/// has to live in the buffer itself.
pub trait Protocol: Send + Sync + 'static {
    /// The decoded, application-level unit.
    type Message: Send + 'static;

    /// Decode at most one message from the front of `src`.
    ///
    /// Returns `Ok(None)` when `src` does not yet hold a whole frame. Bytes of
    /// a decoded frame must be removed from `src`. A frame larger than
    /// `max_message_size` must be reported as [`ProtocolError::FrameTooLarge`].
    fn decode(
        &self,
        src: &mut BytesMut,
        max_message_size: usize,
    ) -> Result<Option<Self::Message>, ProtocolError>;

    /// Append the wire form of `message` to `dst`.
    fn encode(&self, message: Self::Message, dst: &mut BytesMut) -> Result<(), ProtocolError>;
}

/// Shared protocol as stored by the server and its connections.
pub type SharedProtocol<M> = Arc<dyn Protocol<Message = M>>;
