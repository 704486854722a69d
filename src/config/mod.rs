//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → GateConfig handed to Gate::new once
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a gate never observes changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AppConfig;
pub use schema::GateConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
