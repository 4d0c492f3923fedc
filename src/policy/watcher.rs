//! Hostname policy file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;

use crate::policy::PolicyAuthority;

/// Watches the hostname policy file and reloads the policy authority on change.
pub struct PolicyWatcher {
    policy: Arc<PolicyAuthority>,
}

impl PolicyWatcher {
    pub fn new(policy: Arc<PolicyAuthority>) -> Self {
        Self { policy }
    }

    /// Start watching. The returned watcher must be kept alive for reloads
    /// to continue.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let policy = self.policy.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Hostname policy change detected, reloading...");
                        if let Err(e) = policy.reload_hostname_policy() {
                            tracing::error!(
                                error = %e,
                                "Failed to reload hostname policy. Keeping current policy."
                            );
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(self.policy.hostname_policy_path(), RecursiveMode::NonRecursive)?;

        tracing::info!(
            path = %self.policy.hostname_policy_path().display(),
            "Hostname policy watcher started"
        );
        Ok(watcher)
    }
}
