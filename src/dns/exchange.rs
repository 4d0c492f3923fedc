//! Single DNS attempts against upstream servers.
//!
//! The resolver owns retries, so an exchange performs exactly one attempt and
//! only classifies the outcome.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::{ResolveError, ResolveErrorKind, Resolver};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Outcome classification of a failed attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Worth another attempt (timeout, SERVFAIL, REFUSED, network error).
    #[error("transient: {0}")]
    Transient(String),
    /// The answer will not change (NXDOMAIN, NOERROR with no records).
    #[error("permanent: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait DnsExchange: Send + Sync {
    async fn lookup_ip(&self, hostname: &str) -> Result<Vec<IpAddr>, ExchangeError>;
}

/// Exchange backed by hickory-resolver with its own retries disabled.
pub struct HickoryExchange {
    resolver: Resolver<TokioConnectionProvider>,
}

impl HickoryExchange {
    pub fn new(servers: &[SocketAddr], timeout: Duration) -> Self {
        let name_servers: Vec<NameServerConfig> = servers
            .iter()
            .map(|addr| NameServerConfig::new(*addr, Protocol::Udp))
            .collect();
        let config = ResolverConfig::from_parts(None, vec![], name_servers);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();

        Self { resolver }
    }
}

#[async_trait]
impl DnsExchange for HickoryExchange {
    async fn lookup_ip(&self, hostname: &str) -> Result<Vec<IpAddr>, ExchangeError> {
        match self.resolver.lookup_ip(hostname).await {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(e) => Err(classify(&e)),
        }
    }
}

/// hickory reports every negative answer as `NoRecordsFound`; only the
/// response code tells an authoritative "no" from a failing server.
fn classify(e: &ResolveError) -> ExchangeError {
    let permanent = match e.kind() {
        ResolveErrorKind::Proto(proto) => match proto.kind() {
            ProtoErrorKind::NoRecordsFound { response_code, .. } => {
                matches!(*response_code, ResponseCode::NXDomain | ResponseCode::NoError)
            }
            _ => false,
        },
        _ => false,
    };
    if permanent {
        ExchangeError::Permanent(e.to_string())
    } else {
        ExchangeError::Transient(e.to_string())
    }
}
