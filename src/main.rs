//! RA node binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     config.toml ──▶ Startup ──▶ PolicyAuthority ──▶ DNS resolver ──▶ peer clients
//!                                                                        │
//!                                  (VA: endpoint or broker, CA/SA: broker)
//!                                                                        ▼
//!     RA requests ──▶ inbound server ──▶ admission ──▶ RegistrationAuthority
//!
//!     background: debug endpoint (Prometheus), runtime profiler, policy watcher
//! ```
//!
//! Any startup failure logs one fatal line naming the failed stage and exits
//! non-zero before traffic is accepted.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ra_node::clock::SystemClock;
use ra_node::config::LoggingConfig;
use ra_node::lifecycle::{
    launch_background, root_stats, signals, watch_hostname_policy, Shutdown, Startup,
};
use ra_node::observability::logging::{
    init_logging, install_audit_panic_hook, version_string, CLIENT_NAME,
};

#[derive(Parser, Debug)]
#[command(name = "ra-node", version, about = "Registration authority node")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut startup = Startup::new(Arc::new(SystemClock));

    let config = match startup.load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            tracing::error!(stage = %e.stage(), error = %e, "Fatal startup error");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);
    install_audit_panic_hook();
    tracing::info!("{}", version_string(CLIENT_NAME));

    let stats = root_stats(&config);
    let shutdown = Shutdown::new();
    launch_background(&config, &stats, &shutdown);

    let assembled = match startup.assemble(&config, &stats).await {
        Ok(assembled) => assembled,
        Err(e) => {
            tracing::error!(stage = %e.stage(), error = %e, "Fatal startup error");
            shutdown.trigger();
            return ExitCode::FAILURE;
        }
    };

    let _watcher = watch_hostname_policy(assembled.policy.clone());
    tokio::spawn(signals::reload_on_hangup(
        assembled.policy.clone(),
        shutdown.clone(),
    ));
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let stopped = shutdown.wait();
    let result = startup.serve(assembled.server, stopped).await;
    shutdown.trigger();

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(stage = %e.stage(), error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}
