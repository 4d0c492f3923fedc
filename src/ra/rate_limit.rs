//! Rate-limit policies loaded at startup.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate_limit_policies_file must be provided")]
    MissingFile,
    #[error("reading rate limit policies {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing rate limit policies {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single limit. A threshold of zero disables it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimitPolicy {
    pub threshold: u64,
}

impl RateLimitPolicy {
    pub fn enabled(&self) -> bool {
        self.threshold > 0
    }

    /// True once `count` has reached the threshold.
    pub fn exceeded_by(&self, count: u64) -> bool {
        self.enabled() && count >= self.threshold
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitPolicies {
    pub pending_authorizations_per_account: RateLimitPolicy,
    pub certificates_per_name: RateLimitPolicy,
}

impl RateLimitPolicies {
    pub fn load(path: Option<&Path>) -> Result<Self, RateLimitError> {
        let path = match path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return Err(RateLimitError::MissingFile),
        };
        let content = fs::read_to_string(path).map_err(|source| RateLimitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| RateLimitError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
