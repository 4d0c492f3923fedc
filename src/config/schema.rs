//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the RA node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for the RA node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RaNodeConfig {
    /// Registration authority settings.
    pub ra: RaConfig,

    /// Signing algorithms accepted for certificate keys. Absent means the
    /// default key policy.
    pub allowed_signing_algos: Option<AllowedSigningAlgos>,

    /// Policy authority settings.
    pub pa: PaConfig,

    /// Metric naming.
    pub stats: StatsConfig,

    /// Log output.
    pub logging: LoggingConfig,

    /// Settings shared by every Boulder-style service.
    pub common: CommonConfig,
}

/// RA-specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RaConfig {
    /// Address the inbound RPC endpoint binds to.
    pub listen_address: String,

    /// Address of the debug/metrics endpoint. Absent disables it.
    pub debug_address: Option<String>,

    /// Source of the hostname blocklist. Required.
    pub hostname_policy_file: Option<PathBuf>,

    /// Source of the rate-limit policies. Required.
    pub rate_limit_policies_file: Option<PathBuf>,

    /// Ceiling on concurrently in-flight inbound requests (0 = unbounded).
    pub max_concurrent_rpc_server_requests: usize,

    /// Maximum contacts accepted on a single registration (0 = unbounded).
    pub max_contacts_per_registration: usize,

    /// Ask the Validation peer whether a domain is safe before authorizing it.
    pub use_is_safe_domain: bool,

    /// Number of times to try a DNS query that failed transiently.
    /// Zero or negative values are treated as a single try.
    pub dns_tries: i64,

    /// Endpoint descriptor for the modern Validation transport.
    pub va_service: Option<EndpointConfig>,

    /// Legacy message-broker connection shared by all peers.
    pub amqp: BrokerConfig,

    /// Maximum names on a single certificate.
    pub max_names: usize,

    /// Leave the CSR common name alone instead of forcing it to the first name.
    pub do_not_force_cn: bool,

    /// Reuse an existing valid authorization instead of creating a new one.
    pub reuse_valid_authz: bool,

    /// Inbound request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RaConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:9094".to_string(),
            debug_address: None,
            hostname_policy_file: None,
            rate_limit_policies_file: None,
            max_concurrent_rpc_server_requests: 16,
            max_contacts_per_registration: 100,
            use_is_safe_domain: false,
            dns_tries: 3,
            va_service: None,
            amqp: BrokerConfig::default(),
            max_names: 100,
            do_not_force_cn: false,
            reuse_valid_authz: false,
            request_timeout_secs: 30,
        }
    }
}

/// Structured endpoint descriptor for the modern transport.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    /// Peer addresses (e.g., "va.service:9092"), tried in order.
    pub server_addresses: Vec<String>,

    /// PEM issuer certificate for the peer. Present selects TLS.
    #[serde(default)]
    pub server_issuer_path: Option<PathBuf>,

    /// Per-call timeout (e.g., "15s").
    #[serde(default = "default_endpoint_timeout")]
    pub timeout: String,
}

fn default_endpoint_timeout() -> String {
    "15s".to_string()
}

/// Legacy message-broker connection parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker URL (e.g., "ws://broker:5673").
    pub server: String,

    /// Server queue of each peer service.
    pub va_queue: String,
    pub ca_queue: String,
    pub sa_queue: String,

    /// Per-call timeout (e.g., "10s").
    pub timeout: String,

    /// Number of connection attempts before giving up.
    pub connect_attempts: u32,

    /// Base delay between connection attempts in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum delay between connection attempts in milliseconds.
    pub reconnect_max_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: "ws://127.0.0.1:5673".to_string(),
            va_queue: "VA.server".to_string(),
            ca_queue: "CA.server".to_string(),
            sa_queue: "SA.server".to_string(),
            timeout: "10s".to_string(),
            connect_attempts: 3,
            reconnect_base_ms: 100,
            reconnect_max_ms: 2000,
        }
    }
}

/// Signing algorithms allowed for subscriber keys.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AllowedSigningAlgos {
    pub rsa: bool,
    pub ecdsa_nist_p256: bool,
    pub ecdsa_nist_p384: bool,
    pub ecdsa_nist_p521: bool,
}

impl Default for AllowedSigningAlgos {
    fn default() -> Self {
        Self {
            rsa: true,
            ecdsa_nist_p256: true,
            ecdsa_nist_p384: true,
            ecdsa_nist_p521: false,
        }
    }
}

/// Policy authority configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PaConfig {
    /// Challenge type name to enabled flag (e.g., "http-01" = true).
    pub challenges: BTreeMap<String, bool>,
}

/// Metric naming configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Prefix applied to every metric name.
    pub prefix: String,

    /// Interval of the runtime profiling loop in seconds.
    pub profile_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            prefix: "boulder".to_string(),
            profile_interval_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Network settings shared across services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommonConfig {
    /// Recursive resolver address (e.g., "127.0.0.1:8053").
    pub dns_resolver: String,

    /// DNS timeout (e.g., "10s").
    pub dns_timeout: String,

    /// Permit resolution to loopback and private ranges. Test environments only.
    pub dns_allow_loopback_addresses: bool,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            dns_resolver: "127.0.0.1:53".to_string(),
            dns_timeout: "10s".to_string(),
            dns_allow_loopback_addresses: false,
        }
    }
}
