//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RaNodeConfig (validated, immutable)
//!     → consumed by the startup sequencer, then dropped
//! ```
//!
//! # Design Decisions
//! - Config is read once at process start and never reloaded
//! - All fields have defaults to allow minimal configs, except the policy
//!   file paths which startup requires
//! - Validation separates syntactic (serde) from semantic checks

pub mod duration;
pub mod loader;
pub mod schema;
pub mod validation;

pub use duration::{parse_duration, DurationError};
pub use loader::{load_config, ConfigError};
pub use schema::{
    AllowedSigningAlgos, BrokerConfig, CommonConfig, EndpointConfig, LoggingConfig, PaConfig,
    RaConfig, RaNodeConfig, StatsConfig,
};
pub use validation::{validate_config, ValidationError};
