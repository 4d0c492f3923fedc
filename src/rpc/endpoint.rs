//! Modern endpoint transport: JSON request/response over HTTP.
//!
//! Calls go to `<scheme>://<address>/<service>/<method>`. Addresses are tried
//! in configured order; a connection failure or timeout moves to the next
//! address, a response from the peer (success or error) does not.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::config::{parse_duration, EndpointConfig};
use crate::observability::metrics::StatsScope;
use crate::rpc::channel::{RemoteError, RpcChannel, RpcError, Transport};

pub struct EndpointChannel {
    service: String,
    client: reqwest::Client,
    base_urls: Vec<Url>,
    stats: StatsScope,
}

impl EndpointChannel {
    /// Build a channel from an endpoint descriptor. No connection is made
    /// until the first call.
    pub fn connect(
        service: &str,
        config: &EndpointConfig,
        stats: StatsScope,
    ) -> Result<Self, RpcError> {
        if config.server_addresses.is_empty() {
            return Err(RpcError::Config("no server addresses".to_string()));
        }
        let timeout =
            parse_duration(&config.timeout).map_err(|e| RpcError::Config(e.to_string()))?;

        let mut builder = reqwest::Client::builder().timeout(timeout);
        let scheme = match &config.server_issuer_path {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    RpcError::Config(format!("reading issuer {}: {}", path.display(), e))
                })?;
                let issuer = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    RpcError::Config(format!("parsing issuer {}: {}", path.display(), e))
                })?;
                builder = builder.add_root_certificate(issuer);
                "https"
            }
            None => "http",
        };

        let base_urls = config
            .server_addresses
            .iter()
            .map(|addr| {
                Url::parse(&format!("{scheme}://{addr}/"))
                    .map_err(|e| RpcError::Config(format!("invalid server address {addr:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = builder
            .build()
            .map_err(|e| RpcError::Config(format!("building HTTP client: {e}")))?;

        tracing::info!(
            service,
            servers = ?config.server_addresses,
            timeout = ?timeout,
            tls = config.server_issuer_path.is_some(),
            "Endpoint channel ready"
        );

        Ok(Self {
            service: service.to_string(),
            client,
            base_urls,
            stats,
        })
    }
}

#[async_trait]
impl RpcChannel for EndpointChannel {
    async fn call(&self, method: &str, body: Value) -> Result<Value, RpcError> {
        self.stats.inc("calls", 1);
        let mut last_error = RpcError::Closed;

        for (i, base) in self.base_urls.iter().enumerate() {
            let url = base
                .join(&format!("{}/{}", self.service, method))
                .map_err(|e| RpcError::Config(e.to_string()))?;

            match self.client.post(url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    return response.json::<Value>().await.map_err(|e| RpcError::Transport {
                        method: method.to_string(),
                        reason: e.to_string(),
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    let remote = response.json::<RemoteError>().await.unwrap_or(RemoteError {
                        kind: "http".to_string(),
                        detail: status.to_string(),
                    });
                    return Err(RpcError::Remote(remote));
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!(server_idx = i, method, "Endpoint timeout, trying next server");
                    self.stats.inc("timeouts", 1);
                    last_error = RpcError::Timeout {
                        method: method.to_string(),
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        server_idx = i,
                        method,
                        error = %e,
                        "Endpoint error, trying next server"
                    );
                    last_error = RpcError::Transport {
                        method: method.to_string(),
                        reason: e.to_string(),
                    };
                }
            }
        }

        Err(last_error)
    }

    fn transport(&self) -> Transport {
        Transport::Modern
    }
}

impl std::fmt::Debug for EndpointChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointChannel")
            .field("service", &self.service)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}
