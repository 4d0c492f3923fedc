//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Emit the version line at startup
//! - Route panics through the audit log target
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Initialization is idempotent; a second call is ignored

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Name this service logs and scopes its metrics under.
pub const CLIENT_NAME: &str = "RA";

/// Initialize the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ra_node={},tower_http=info", config.level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Human-readable build identification.
pub fn version_string(name: &str) -> String {
    format!(
        "Versions: {}=({} {})",
        name,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

/// Log panics as audit events before the default hook runs.
pub fn install_audit_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(target: "audit", panic = %info, "Panic caught");
        default_hook(info);
    }));
}
