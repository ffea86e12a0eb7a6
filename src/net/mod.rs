//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, Accept trait, transient error classification)
//!     → server.rs (accept loop with backoff)
//!     → connection.rs (state machine, inbound + outbound pumps)
//!     → registry.rs (keyed by peer address)
//!     → reaper.rs (evicts entries once Closed)
//!
//! Connection States:
//!     Open → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - Each connection owns exactly two tasks; nothing else touches its socket
//! - Close is a signal, so it never blocks on I/O
//! - Dialed connections belong to the caller and are not registered

pub mod connection;
pub mod listener;
pub mod reaper;
pub mod registry;
pub mod server;

#[cfg(test)]
mod test_support;

pub use connection::{CloseReason, Connection, ConnectionId, ConnectionState};
pub use listener::Accept;
pub use registry::ConnectionRegistry;
pub use server::Server;
