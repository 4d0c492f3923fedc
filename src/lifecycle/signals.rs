//! OS signal handling.
//!
//! # Responsibilities
//! - Translate SIGINT/SIGTERM into a shutdown trigger
//! - Reload the hostname policy on SIGHUP
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failure to register a handler is logged, not fatal

use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;
use crate::policy::PolicyAuthority;

/// Wait for Ctrl-C or SIGTERM, then trigger `shutdown`.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
    shutdown.trigger();
}

/// Reload the hostname policy each time SIGHUP arrives, until shutdown.
#[cfg(unix)]
pub async fn reload_on_hangup(policy: Arc<PolicyAuthority>, shutdown: Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to listen for SIGHUP; policy reload by signal disabled"
            );
            return;
        }
    };
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                tracing::info!("Received SIGHUP, reloading hostname policy");
                if let Err(e) = policy.reload_hostname_policy() {
                    tracing::error!(
                        error = %e,
                        "Failed to reload hostname policy. Keeping current policy."
                    );
                }
            }
            _ = stop.recv() => break,
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(_policy: Arc<PolicyAuthority>, _shutdown: Shutdown) {}
