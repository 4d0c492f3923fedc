//! Registration authority node.
//!
//! Loads configuration, wires the policy engine, DNS resolver and peer
//! clients into the RA core, and exposes the RA over an inbound RPC server.

pub mod clock;
pub mod config;
pub mod dns;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod policy;
pub mod ra;
pub mod resilience;
pub mod rpc;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RaNodeConfig;
pub use lifecycle::{Shutdown, Startup, StartupError, StartupState};
pub use ra::RegistrationAuthority;
