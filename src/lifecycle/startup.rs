//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Construct policy, resolver, peers and the RA core in dependency order
//! - Bind the inbound server and begin serving
//! - Launch best-effort background tasks (debug endpoint, profiler, policy watcher)
//!
//! # Design Decisions
//! - Fail fast: the first error moves the sequence to `Failed` and every
//!   later step is refused
//! - Steps return `StartupError` instead of exiting; only `main` exits
//! - Background task failures are logged and never abort startup
//!
//! # State Machine
//! ```text
//! Unconfigured → ConfigLoaded → PolicyReady → ResolverReady → PeersReady
//!     → CoreAssembled → ServerBound → Serving
//!
//! any step ──error──▶ Failed (absorbing)
//! ```

use notify::RecommendedWatcher;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::{
    load_config, parse_duration, validate_config, ConfigError, DurationError, RaNodeConfig,
    ValidationError,
};
use crate::dns::{self, DnsError, Resolver};
use crate::http::{BoundServer, InboundServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::logging::CLIENT_NAME;
use crate::observability::metrics::{init_debug_server, StatsScope};
use crate::observability::profiling::run_profiler;
use crate::policy::{PolicyAuthority, PolicyError, PolicyWatcher};
use crate::ra::{
    Dependencies, RaSettings, RateLimitError, RateLimitPolicies, RegistrationAuthority,
};
use crate::rpc::{PeerClients, PeerSetupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    Unconfigured,
    ConfigLoaded,
    PolicyReady,
    ResolverReady,
    PeersReady,
    CoreAssembled,
    ServerBound,
    Serving,
    Failed,
}

impl StartupState {
    /// The only state a step into `self` may start from.
    fn predecessor(self) -> Option<StartupState> {
        use StartupState::*;
        match self {
            ConfigLoaded => Some(Unconfigured),
            PolicyReady => Some(ConfigLoaded),
            ResolverReady => Some(PolicyReady),
            PeersReady => Some(ResolverReady),
            CoreAssembled => Some(PeersReady),
            ServerBound => Some(CoreAssembled),
            Serving => Some(ServerBound),
            Unconfigured | Failed => None,
        }
    }
}

impl fmt::Display for StartupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Underlying cause of a failed step.
#[derive(Debug, Error)]
pub enum StartupCause {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("couldn't create PA: {0}")]
    Policy(#[from] PolicyError),
    #[error("invalid dns_timeout: {0}")]
    DnsTimeout(#[source] DurationError),
    #[error("couldn't create DNS resolver: {0}")]
    Resolver(#[from] DnsError),
    #[error(transparent)]
    Peers(#[from] PeerSetupError),
    #[error("couldn't load rate limit policies: {0}")]
    RateLimits(#[from] RateLimitError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("inbound server failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error("cannot enter {attempted} from {current}")]
    OutOfOrder {
        attempted: StartupState,
        current: StartupState,
    },
}

/// A fatal startup failure and the step it happened in.
#[derive(Debug, Error)]
#[error("startup failed at {stage}: {cause}")]
pub struct StartupError {
    stage: StartupState,
    #[source]
    cause: StartupCause,
}

impl StartupError {
    /// The state the sequence was trying to enter.
    pub fn stage(&self) -> StartupState {
        self.stage
    }

    pub fn cause(&self) -> &StartupCause {
        &self.cause
    }
}

/// Everything `assemble` produces that outlives it.
pub struct Assembled {
    pub server: BoundServer,
    pub policy: Arc<PolicyAuthority>,
}

/// Drives the startup sequence and records every state it passes through.
#[derive(Debug)]
pub struct Startup {
    state: StartupState,
    history: Vec<StartupState>,
    clock: Arc<dyn Clock>,
}

impl Startup {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: StartupState::Unconfigured,
            history: vec![StartupState::Unconfigured],
            clock,
        }
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    pub fn history(&self) -> &[StartupState] {
        &self.history
    }

    fn enter(&mut self, state: StartupState) {
        self.state = state;
        self.history.push(state);
    }

    fn fail(&mut self, stage: StartupState, cause: StartupCause) -> StartupError {
        if self.state != StartupState::Failed {
            self.enter(StartupState::Failed);
        }
        StartupError { stage, cause }
    }

    fn begin(&mut self, next: StartupState) -> Result<(), StartupError> {
        if next.predecessor() == Some(self.state) {
            return Ok(());
        }
        let current = self.state;
        Err(self.fail(
            next,
            StartupCause::OutOfOrder {
                attempted: next,
                current,
            },
        ))
    }

    fn finish<T, E>(&mut self, next: StartupState, result: Result<T, E>) -> Result<T, StartupError>
    where
        E: Into<StartupCause>,
    {
        match result {
            Ok(value) => {
                self.enter(next);
                tracing::debug!(state = %next, "Startup step complete");
                Ok(value)
            }
            Err(e) => Err(self.fail(next, e.into())),
        }
    }

    /// Read and validate configuration. Touches no network resource.
    pub fn load_config(&mut self, path: &Path) -> Result<RaNodeConfig, StartupError> {
        self.begin(StartupState::ConfigLoaded)?;
        let result = load_config(path)
            .map_err(StartupCause::from)
            .and_then(|config| match validate_config(&config) {
                Ok(_) => Ok(config),
                Err(e) => Err(StartupCause::from(e)),
            });
        self.finish(StartupState::ConfigLoaded, result)
    }

    pub fn build_policy(
        &mut self,
        config: &RaNodeConfig,
    ) -> Result<Arc<PolicyAuthority>, StartupError> {
        self.begin(StartupState::PolicyReady)?;
        let result = validate_config(config)
            .map_err(StartupCause::from)
            .and_then(|path| {
                PolicyAuthority::new(&config.pa.challenges, path).map_err(StartupCause::from)
            })
            .map(Arc::new);
        self.finish(StartupState::PolicyReady, result)
    }

    pub fn build_resolver(
        &mut self,
        config: &RaNodeConfig,
        stats: &StatsScope,
    ) -> Result<Arc<dyn Resolver>, StartupError> {
        self.begin(StartupState::ResolverReady)?;
        let clock = self.clock.clone();
        let result = parse_duration(&config.common.dns_timeout)
            .map_err(StartupCause::DnsTimeout)
            .and_then(|timeout| {
                dns::build_resolver(
                    timeout,
                    std::slice::from_ref(&config.common.dns_resolver),
                    config.common.dns_allow_loopback_addresses,
                    config.ra.dns_tries,
                    clock,
                    stats.scope("dns"),
                )
                .map_err(StartupCause::from)
            })
            .map(|resolver| Arc::new(resolver) as Arc<dyn Resolver>);
        self.finish(StartupState::ResolverReady, result)
    }

    pub async fn connect_peers(
        &mut self,
        config: &RaNodeConfig,
        stats: &StatsScope,
    ) -> Result<PeerClients, StartupError> {
        self.begin(StartupState::PeersReady)?;
        let result = PeerClients::connect(CLIENT_NAME, &config.ra, stats).await;
        self.finish(StartupState::PeersReady, result)
    }

    pub fn assemble_core(
        &mut self,
        config: &RaNodeConfig,
        policy: Arc<PolicyAuthority>,
        resolver: Arc<dyn Resolver>,
        peers: PeerClients,
    ) -> Result<Arc<RegistrationAuthority>, StartupError> {
        self.begin(StartupState::CoreAssembled)?;
        let clock = self.clock.clone();
        let result = RateLimitPolicies::load(config.ra.rate_limit_policies_file.as_deref()).map(
            |rate_limits| {
                let settings = RaSettings::from_config(config, rate_limits);
                let deps = Dependencies {
                    policy,
                    resolver,
                    va: Arc::new(peers.va),
                    ca: Arc::new(peers.ca),
                    sa: Arc::new(peers.sa),
                };
                Arc::new(RegistrationAuthority::new(settings, deps, clock))
            },
        );
        self.finish(StartupState::CoreAssembled, result)
    }

    pub async fn bind_server(
        &mut self,
        config: &RaNodeConfig,
        ra: Arc<RegistrationAuthority>,
        stats: &StatsScope,
    ) -> Result<BoundServer, StartupError> {
        self.begin(StartupState::ServerBound)?;
        let server = InboundServer::new(
            ra,
            config.ra.max_concurrent_rpc_server_requests,
            Duration::from_secs(config.ra.request_timeout_secs),
            stats.scope("server"),
        );
        let result = server.bind(&config.ra.listen_address).await;
        self.finish(StartupState::ServerBound, result)
    }

    /// Run every construction step after `load_config`, in order.
    pub async fn assemble(
        &mut self,
        config: &RaNodeConfig,
        stats: &StatsScope,
    ) -> Result<Assembled, StartupError> {
        let policy = self.build_policy(config)?;
        let resolver = self.build_resolver(config, stats)?;
        let peers = self.connect_peers(config, stats).await?;
        let ra = self.assemble_core(config, policy.clone(), resolver, peers)?;
        let server = self.bind_server(config, ra, stats).await?;
        Ok(Assembled { server, policy })
    }

    /// Enter `Serving` and block until `shutdown` resolves.
    pub async fn serve<F>(&mut self, server: BoundServer, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.begin(StartupState::Serving)?;
        self.enter(StartupState::Serving);
        tracing::info!(address = %server.local_addr(), "RA node serving");
        server
            .serve(shutdown)
            .await
            .map_err(|e| self.fail(StartupState::Serving, StartupCause::Serve(e)))
    }
}

/// Root statistics scope for this node.
pub fn root_stats(config: &RaNodeConfig) -> StatsScope {
    StatsScope::new(&config.stats.prefix).scope(CLIENT_NAME)
}

/// Start the debug endpoint and profiling loop. Neither can fail startup.
pub fn launch_background(config: &RaNodeConfig, stats: &StatsScope, shutdown: &Shutdown) {
    match config.ra.debug_address.as_deref() {
        Some(addr) => match addr.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_debug_server(addr) {
                    tracing::warn!(address = %addr, error = %e, "Debug server unavailable");
                }
            }
            Err(e) => tracing::warn!(address = addr, error = %e, "Invalid debug address"),
        },
        None => tracing::debug!("No debug address configured"),
    }

    tokio::spawn(run_profiler(
        stats.clone(),
        Duration::from_secs(config.stats.profile_interval_secs),
        shutdown.subscribe(),
    ));
}

/// Hot-reload the hostname policy when its file changes. Best-effort.
pub fn watch_hostname_policy(policy: Arc<PolicyAuthority>) -> Option<RecommendedWatcher> {
    match PolicyWatcher::new(policy).run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Hostname policy watcher unavailable");
            None
        }
    }
}
