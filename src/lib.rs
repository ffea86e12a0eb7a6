//! Connection-oriented TCP server library.
//!
//! Plug in a [`Protocol`] for framing and an [`EventHandler`] for
//! application logic; the [`Server`] handles accepting, per-connection
//! read/write pumps, ordered delivery, and close bookkeeping.

pub mod config;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod resilience;

pub use config::schema::ServerConfig;
pub use error::{SendError, ServerError};
pub use handler::{EventHandler, SharedHandler};
pub use lifecycle::Shutdown;
pub use net::{Accept, CloseReason, Connection, ConnectionId, ConnectionState, Server};
pub use protocol::{LengthPrefixed, LineDelimited, Protocol, ProtocolError, SharedProtocol};
