//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Provide a shared statistics sink (`StatsScope`) to every component
//! - Expose a Prometheus-compatible debug endpoint
//!
//! # Metrics
//! - `<prefix>_ra_dns_<stat>`: resolver attempts, outcomes, latency
//! - `<prefix>_ra_rpc_<peer>_<stat>`: peer client calls and errors
//! - `<prefix>_ra_server_<stat>`: inbound admission and requests
//! - `<prefix>_ra_runtime_<stat>`: profiling loop gauges
//!
//! # Design Decisions
//! - Scopes are cheap clones; the recorder behind the `metrics` facade is global
//! - Without an installed recorder every update is a no-op

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// A named prefix under which a component records its metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsScope {
    prefix: String,
}

impl StatsScope {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: sanitize(prefix),
        }
    }

    /// A child scope, e.g. `boulder` → `boulder_ra`.
    pub fn scope(&self, name: &str) -> Self {
        Self {
            prefix: format!("{}_{}", self.prefix, sanitize(name)),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn metric_name(&self, stat: &str) -> String {
        format!("{}_{}", self.prefix, sanitize(stat))
    }

    pub fn inc(&self, stat: &str, value: u64) {
        metrics::counter!(self.metric_name(stat)).increment(value);
    }

    pub fn gauge(&self, stat: &str, value: f64) {
        metrics::gauge!(self.metric_name(stat)).set(value);
    }

    pub fn timing(&self, stat: &str, elapsed: Duration) {
        metrics::histogram!(self.metric_name(stat)).record(elapsed.as_secs_f64());
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_debug_server(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Debug server started");
    Ok(())
}
