//! Retrying resolver and its factory.

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::clock::Clock;
use crate::dns::address::is_restricted;
use crate::dns::exchange::{DnsExchange, ExchangeError, HickoryExchange};
use crate::observability::metrics::StatsScope;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnsError {
    #[error("invalid DNS server address {address:?}: {reason}")]
    InvalidServer { address: String, reason: String },
    #[error("no DNS servers configured")]
    NoServers,
    #[error("DNS lookup of {hostname} failed: {reason}")]
    Permanent { hostname: String, reason: String },
    #[error("DNS lookup of {hostname} failed after {tries} tries: {reason}")]
    RetriesExhausted {
        hostname: String,
        tries: u32,
        reason: String,
    },
    #[error("{hostname} resolves only to restricted addresses: {addrs:?}")]
    RestrictedAddress { hostname: String, addrs: Vec<IpAddr> },
}

/// Which safety profile a resolver runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverVariant {
    /// Refuses loopback and private targets.
    Production,
    /// Permits loopback and private targets. Test environments only.
    Loopback,
}

impl ResolverVariant {
    pub fn from_allow_loopback(allow_loopback: bool) -> Self {
        if allow_loopback {
            ResolverVariant::Loopback
        } else {
            ResolverVariant::Production
        }
    }
}

/// The DNS capability used by the RA core.
#[async_trait]
pub trait Resolver: Send + Sync + std::fmt::Debug {
    async fn lookup_host(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError>;
}

/// Clamp a configured retry count to at least one try.
pub fn effective_tries(configured: i64) -> u32 {
    configured.clamp(1, u32::MAX as i64) as u32
}

/// Resolver that retries transient failures and enforces its variant's
/// address policy.
pub struct DnsResolver<E> {
    exchange: E,
    variant: ResolverVariant,
    timeout: Duration,
    max_tries: u32,
    stats: StatsScope,
    clock: Arc<dyn Clock>,
}

impl<E: DnsExchange> DnsResolver<E> {
    pub fn new(
        exchange: E,
        variant: ResolverVariant,
        timeout: Duration,
        retry_budget: i64,
        stats: StatsScope,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exchange,
            variant,
            timeout,
            max_tries: effective_tries(retry_budget),
            stats,
            clock,
        }
    }

    pub fn variant(&self) -> ResolverVariant {
        self.variant
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Each try gets the full timeout; a timed-out try counts as transient.
    async fn lookup_with_retries(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        let mut tries = 0;
        loop {
            tries += 1;
            let outcome = match timeout(self.timeout, self.exchange.lookup_ip(hostname)).await {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::Transient(format!(
                    "timed out after {:?}",
                    self.timeout
                ))),
            };

            match outcome {
                Ok(addrs) => {
                    self.stats.inc("tries", tries as u64);
                    return Ok(addrs);
                }
                Err(ExchangeError::Permanent(reason)) => {
                    self.stats.inc("tries", tries as u64);
                    self.stats.inc("permanent_errors", 1);
                    return Err(DnsError::Permanent {
                        hostname: hostname.to_string(),
                        reason,
                    });
                }
                Err(ExchangeError::Transient(reason)) => {
                    self.stats.inc("transient_errors", 1);
                    if tries >= self.max_tries {
                        self.stats.inc("tries", tries as u64);
                        self.stats.inc("out_of_retries", 1);
                        return Err(DnsError::RetriesExhausted {
                            hostname: hostname.to_string(),
                            tries,
                            reason,
                        });
                    }
                    tracing::debug!(hostname, tries, reason = %reason, "Retrying DNS query");
                }
            }
        }
    }
}

#[async_trait]
impl<E: DnsExchange> Resolver for DnsResolver<E> {
    async fn lookup_host(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        let started = self.clock.now();
        let result = self.lookup_with_retries(hostname).await;
        if let Ok(elapsed) = self.clock.now().duration_since(started) {
            self.stats.timing("lookup_host_time", elapsed);
        }

        let addrs = result?;
        if self.variant == ResolverVariant::Loopback {
            return Ok(addrs);
        }

        let (allowed, restricted): (Vec<IpAddr>, Vec<IpAddr>) =
            addrs.into_iter().partition(|ip| !is_restricted(*ip));
        if allowed.is_empty() && !restricted.is_empty() {
            self.stats.inc("restricted_answers", 1);
            return Err(DnsError::RestrictedAddress {
                hostname: hostname.to_string(),
                addrs: restricted,
            });
        }
        Ok(allowed)
    }
}

impl<E> std::fmt::Debug for DnsResolver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("variant", &self.variant)
            .field("timeout", &self.timeout)
            .field("max_tries", &self.max_tries)
            .finish()
    }
}

/// Parse `host:port` server strings.
pub fn parse_servers(servers: &[String]) -> Result<Vec<SocketAddr>, DnsError> {
    if servers.is_empty() {
        return Err(DnsError::NoServers);
    }
    servers
        .iter()
        .map(|s| {
            s.parse::<SocketAddr>().map_err(|e| DnsError::InvalidServer {
                address: s.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Build the resolver variant selected by `allow_loopback`.
pub fn build_resolver(
    timeout: Duration,
    servers: &[String],
    allow_loopback: bool,
    retry_budget: i64,
    clock: Arc<dyn Clock>,
    stats: StatsScope,
) -> Result<DnsResolver<HickoryExchange>, DnsError> {
    let addrs = parse_servers(servers)?;
    let variant = ResolverVariant::from_allow_loopback(allow_loopback);
    let resolver = DnsResolver::new(
        HickoryExchange::new(&addrs, timeout),
        variant,
        timeout,
        retry_budget,
        stats,
        clock,
    );

    if variant == ResolverVariant::Loopback {
        tracing::warn!("DNS resolver permits loopback and private addresses");
    }
    tracing::info!(
        servers = ?addrs,
        timeout = ?timeout,
        max_tries = resolver.max_tries(),
        variant = ?variant,
        "DNS resolver ready"
    );
    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted outcomes and counts attempts.
    struct ScriptedExchange {
        script: Mutex<VecDeque<Result<Vec<IpAddr>, ExchangeError>>>,
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    impl ScriptedExchange {
        fn new(script: Vec<Result<Vec<IpAddr>, ExchangeError>>) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    script: Mutex::new(script.into()),
                    calls: calls.clone(),
                    delay: Duration::ZERO,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl DnsExchange for ScriptedExchange {
        async fn lookup_ip(&self, _hostname: &str) -> Result<Vec<IpAddr>, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ExchangeError::Transient("script exhausted".into())))
        }
    }

    fn resolver(
        exchange: ScriptedExchange,
        variant: ResolverVariant,
        tries: i64,
    ) -> DnsResolver<ScriptedExchange> {
        DnsResolver::new(
            exchange,
            variant,
            Duration::from_secs(1),
            tries,
            StatsScope::new("test"),
            Arc::new(SystemClock),
        )
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn non_positive_retry_budget_becomes_one() {
        for configured in [0, -1, -5, i64::MIN] {
            assert_eq!(effective_tries(configured), 1, "configured {configured}");
        }
        assert_eq!(effective_tries(1), 1);
        assert_eq!(effective_tries(4), 4);
    }

    #[tokio::test]
    async fn zero_budget_still_makes_one_attempt() {
        let (exchange, calls) = ScriptedExchange::new(vec![Ok(vec![ip("1.1.1.1")])]);
        let r = resolver(exchange, ResolverVariant::Production, 0);
        assert_eq!(r.max_tries(), 1);
        assert_eq!(r.lookup_host("example.com").await.unwrap(), vec![ip("1.1.1.1")]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_up_to_budget() {
        let (exchange, calls) = ScriptedExchange::new(vec![
            Err(ExchangeError::Transient("servfail".into())),
            Err(ExchangeError::Transient("servfail".into())),
            Ok(vec![ip("8.8.8.8")]),
        ]);
        let r = resolver(exchange, ResolverVariant::Production, 3);
        assert_eq!(r.lookup_host("example.com").await.unwrap(), vec![ip("8.8.8.8")]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let (exchange, calls) = ScriptedExchange::new(vec![]);
        let r = resolver(exchange, ResolverVariant::Production, 2);
        let err = r.lookup_host("example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::RetriesExhausted { tries: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let (exchange, calls) =
            ScriptedExchange::new(vec![Err(ExchangeError::Permanent("nxdomain".into()))]);
        let r = resolver(exchange, ResolverVariant::Production, 5);
        let err = r.lookup_host("nope.invalid").await.unwrap_err();
        assert!(matches!(err, DnsError::Permanent { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_applies_per_attempt() {
        let (mut exchange, calls) = ScriptedExchange::new(vec![]);
        exchange.delay = Duration::from_millis(200);
        let r = DnsResolver::new(
            exchange,
            ResolverVariant::Production,
            Duration::from_millis(20),
            3,
            StatsScope::new("test"),
            Arc::new(SystemClock),
        );
        let err = r.lookup_host("slow.example").await.unwrap_err();
        assert!(matches!(err, DnsError::RetriesExhausted { tries: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn loopback_variant_permits_loopback() {
        let (exchange, _) = ScriptedExchange::new(vec![Ok(vec![ip("127.0.0.1")])]);
        let r = resolver(exchange, ResolverVariant::Loopback, 1);
        assert_eq!(r.lookup_host("localhost.test").await.unwrap(), vec![ip("127.0.0.1")]);
    }

    #[tokio::test]
    async fn production_variant_rejects_loopback() {
        let (exchange, _) = ScriptedExchange::new(vec![Ok(vec![ip("127.0.0.1")])]);
        let r = resolver(exchange, ResolverVariant::Production, 1);
        let err = r.lookup_host("localhost.test").await.unwrap_err();
        assert_eq!(
            err,
            DnsError::RestrictedAddress {
                hostname: "localhost.test".into(),
                addrs: vec![ip("127.0.0.1")],
            }
        );
    }

    #[tokio::test]
    async fn production_variant_filters_mixed_answers() {
        let (exchange, _) =
            ScriptedExchange::new(vec![Ok(vec![ip("10.0.0.1"), ip("93.184.216.34")])]);
        let r = resolver(exchange, ResolverVariant::Production, 1);
        assert_eq!(r.lookup_host("mixed.test").await.unwrap(), vec![ip("93.184.216.34")]);
    }

    #[tokio::test]
    async fn factory_selects_variant_and_clamps_budget() {
        let servers = vec!["127.0.0.1:8053".to_string()];
        let r = build_resolver(
            Duration::from_secs(1),
            &servers,
            false,
            0,
            Arc::new(SystemClock),
            StatsScope::new("test"),
        )
        .unwrap();
        assert_eq!(r.variant(), ResolverVariant::Production);
        assert_eq!(r.max_tries(), 1);

        let r = build_resolver(
            Duration::from_secs(1),
            &servers,
            true,
            3,
            Arc::new(SystemClock),
            StatsScope::new("test"),
        )
        .unwrap();
        assert_eq!(r.variant(), ResolverVariant::Loopback);
        assert_eq!(r.max_tries(), 3);
    }

    #[test]
    fn bad_server_addresses_fail_construction() {
        assert_eq!(parse_servers(&[]), Err(DnsError::NoServers));
        assert!(matches!(
            parse_servers(&["not-an-address".to_string()]),
            Err(DnsError::InvalidServer { .. })
        ));
    }
}
