//! Policy authority subsystem.
//!
//! # Data Flow
//! ```text
//! PaConfig.challenges
//!     → challenges.rs (consistency check, enabled set)
//! hostname policy file (JSON)
//!     → hostname.rs (blocklist)
//!     → PolicyAuthority (shared via Arc with the RA core)
//!
//! On file change:
//!     watcher.rs detects change
//!     → hostname.rs loads new blocklist
//!     → atomic swap inside PolicyAuthority
//! ```
//!
//! # Design Decisions
//! - Construction fails on an invalid challenge map or unloadable policy file
//! - A reload that fails keeps the previous blocklist

pub mod challenges;
pub mod hostname;
pub mod watcher;

use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use challenges::{ChallengeConfigError, ChallengeType};
pub use hostname::{HostnamePolicy, HostnamePolicyError};
pub use watcher::PolicyWatcher;

const MAX_DNS_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Challenges(#[from] ChallengeConfigError),
    #[error(transparent)]
    HostnamePolicy(#[from] HostnamePolicyError),
}

/// Reasons a name is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("name is empty")]
    Empty,
    #[error("name is longer than 253 bytes")]
    TooLong,
    #[error("issuance for IP addresses not supported")]
    IpAddress,
    #[error("name does not have enough labels")]
    TooFewLabels,
    #[error("name contains an invalid label: {0:?}")]
    InvalidLabel(String),
    #[error("policy forbids issuing for name")]
    Blocked,
}

/// Per-hostname validation policy and per-challenge-type rules.
#[derive(Debug)]
pub struct PolicyAuthority {
    enabled: Vec<ChallengeType>,
    hostname_policy: ArcSwap<HostnamePolicy>,
    hostname_policy_path: PathBuf,
}

impl PolicyAuthority {
    /// Build from a challenge map and a hostname policy source.
    pub fn new(
        challenges: &BTreeMap<String, bool>,
        hostname_policy_path: &Path,
    ) -> Result<Self, PolicyError> {
        let enabled = challenges::enabled_challenges(challenges)?;
        let policy = HostnamePolicy::load(hostname_policy_path)?;

        tracing::info!(
            path = %hostname_policy_path.display(),
            entries = policy.len(),
            challenges = ?enabled,
            "Policy authority ready"
        );

        Ok(Self {
            enabled,
            hostname_policy: ArcSwap::from_pointee(policy),
            hostname_policy_path: hostname_policy_path.to_path_buf(),
        })
    }

    pub fn hostname_policy_path(&self) -> &Path {
        &self.hostname_policy_path
    }

    /// Reload the hostname policy from its source. On error the current
    /// policy stays in place.
    pub fn reload_hostname_policy(&self) -> Result<(), HostnamePolicyError> {
        let policy = HostnamePolicy::load(&self.hostname_policy_path)?;
        tracing::info!(entries = policy.len(), "Hostname policy reloaded");
        self.hostname_policy.store(Arc::new(policy));
        Ok(())
    }

    /// Decide whether issuance for `name` is permitted.
    pub fn will_issue_for(&self, name: &str) -> Result<(), IdentifierError> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        if name.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if name.len() > MAX_DNS_NAME_LEN {
            return Err(IdentifierError::TooLong);
        }
        if name.parse::<IpAddr>().is_ok() {
            return Err(IdentifierError::IpAddress);
        }

        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Err(IdentifierError::TooFewLabels);
        }
        for label in &labels {
            if !valid_label(label) {
                return Err(IdentifierError::InvalidLabel(label.to_string()));
            }
        }

        if self.hostname_policy.load().is_blocked(&name) {
            return Err(IdentifierError::Blocked);
        }
        Ok(())
    }

    /// Challenge types offered for `name`.
    pub fn challenges_for(&self, _name: &str) -> Vec<ChallengeType> {
        self.enabled.clone()
    }
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
