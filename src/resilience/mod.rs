//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop:
//!     → accept() fails with a transient error
//!     → backoff.rs (delay grows 5ms, 10ms, 20ms ... capped at 1s)
//!     → retry; a successful accept resets the counter
//! ```
//!
//! # Design Decisions
//! - Only transient accept errors are retried; everything else is fatal
//! - No jitter: a single accept loop has nobody to desynchronise from

pub mod backoff;

pub use backoff::{calculate_backoff, AcceptBackoff};
