//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Server::close → trigger → accept loop stops, reaper stops
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls Server::close
//! ```
//!
//! # Design Decisions
//! - Shutdown is a level, not an event: anyone can check it synchronously
//! - Closing the server signals connections; it does not wait for them to drain

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
