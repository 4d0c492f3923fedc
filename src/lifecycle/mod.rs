//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Policy → Resolver → Peers → RA core → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload hostname policy
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing is served until every dependency exists
//! - Background tasks share the shutdown broadcast and never block startup

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{
    launch_background, root_stats, watch_hostname_policy, Assembled, Startup, StartupCause,
    StartupError, StartupState,
};
