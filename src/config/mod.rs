//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to Server::with_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the read timeout changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AcceptConfig, ConnectionConfig, ListenerConfig, LogFormat, LogTarget, ObservabilityConfig,
    QueueFullPolicy, ReaperConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
