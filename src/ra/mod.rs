//! Registration authority core.
//!
//! # Responsibilities
//! - Accept registrations, authorization requests, challenge responses and
//!   certificate requests from the inbound server
//! - Enforce contact, key, name-count and rate-limit rules
//! - Delegate persistence, validation and signing to peers
//!
//! # Design Decisions
//! - All collaborators arrive together in `Dependencies`; a handle is never
//!   observable with some of them missing
//! - Peers are seen only through capability traits, never through a transport

pub mod authority;
pub mod rate_limit;
pub mod types;

pub use authority::{Dependencies, KeyPolicy, RaError, RaSettings, RegistrationAuthority};
pub use rate_limit::{RateLimitError, RateLimitPolicies, RateLimitPolicy};

use crate::config::RaNodeConfig;

impl RaSettings {
    pub fn from_config(config: &RaNodeConfig, rate_limits: RateLimitPolicies) -> Self {
        Self {
            max_contacts_per_registration: config.ra.max_contacts_per_registration,
            key_policy: KeyPolicy::new(config.allowed_signing_algos),
            max_names: config.ra.max_names,
            force_cn: !config.ra.do_not_force_cn,
            reuse_valid_authz: config.ra.reuse_valid_authz,
            use_is_safe_domain: config.ra.use_is_safe_domain,
            rate_limits,
        }
    }
}
