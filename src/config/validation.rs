//! Configuration validation.
//!
//! # Responsibilities
//! - Check the policy authority's challenge map for consistency
//! - Require a hostname policy source
//!
//! # Design Decisions
//! - Runs before any other construction; touches no network resource
//! - Validation is a pure function: RaNodeConfig → Result<&Path, ValidationError>
//! - Challenge errors are reported before a missing policy path

use std::path::Path;
use thiserror::Error;

use crate::config::schema::RaNodeConfig;
use crate::policy::challenges::{check_challenges, ChallengeConfigError};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid PA configuration: {0}")]
    Challenges(#[from] ChallengeConfigError),
    #[error("hostname_policy_file must be provided")]
    MissingHostnamePolicyFile,
}

/// Validate the settings every later stage depends on.
///
/// Returns the hostname policy path so callers never re-check its presence.
pub fn validate_config(config: &RaNodeConfig) -> Result<&Path, ValidationError> {
    check_challenges(&config.pa.challenges)?;

    match config.ra.hostname_policy_file.as_deref() {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(ValidationError::MissingHostnamePolicyFile),
    }
}
