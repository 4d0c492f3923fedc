//! Peer capabilities and the factory that connects them.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::{BrokerConfig, EndpointConfig, RaConfig};
use crate::observability::metrics::StatsScope;
use crate::ra::types::{
    Authorization, Certificate, CertificateRequest, NewRegistration, Registration, RegistrationId,
};
use crate::rpc::broker::BrokerChannel;
use crate::rpc::channel::{RpcChannel, RpcError, Transport};
use crate::rpc::endpoint::EndpointChannel;

/// The three services the RA depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Validation,
    Certification,
    Storage,
}

impl Peer {
    pub fn service_name(&self) -> &'static str {
        match self {
            Peer::Validation => "VA",
            Peer::Certification => "CA",
            Peer::Storage => "SA",
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

fn broker_queue(broker: &BrokerConfig, peer: Peer) -> &str {
    match peer {
        Peer::Validation => &broker.va_queue,
        Peer::Certification => &broker.ca_queue,
        Peer::Storage => &broker.sa_queue,
    }
}

/// How a peer is reached, decided once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSelection {
    Modern(EndpointConfig),
    Legacy(BrokerConfig),
}

impl TransportSelection {
    /// An endpoint descriptor, when present, always wins.
    pub fn select(endpoint: Option<&EndpointConfig>, broker: &BrokerConfig) -> Self {
        match endpoint {
            Some(endpoint) => TransportSelection::Modern(endpoint.clone()),
            None => TransportSelection::Legacy(broker.clone()),
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            TransportSelection::Modern(_) => Transport::Modern,
            TransportSelection::Legacy(_) => Transport::Legacy,
        }
    }

    pub async fn connect(
        &self,
        client_name: &str,
        peer: Peer,
        stats: StatsScope,
    ) -> Result<Arc<dyn RpcChannel>, RpcError> {
        match self {
            TransportSelection::Modern(endpoint) => Ok(Arc::new(EndpointChannel::connect(
                peer.service_name(),
                endpoint,
                stats,
            )?)),
            TransportSelection::Legacy(broker) => Ok(Arc::new(
                BrokerChannel::connect(client_name, broker_queue(broker, peer), broker, stats)
                    .await?,
            )),
        }
    }
}

/// Domain-control checks.
#[async_trait]
pub trait ValidationAuthority: Send + Sync {
    async fn update_validations(
        &self,
        authz: &Authorization,
        challenge_index: usize,
    ) -> Result<(), RpcError>;

    async fn is_safe_domain(&self, domain: &str) -> Result<bool, RpcError>;
}

/// Certificate issuance.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn issue_certificate(
        &self,
        csr: &CertificateRequest,
        registration_id: RegistrationId,
    ) -> Result<Certificate, RpcError>;
}

/// Persistence of registrations and authorizations.
#[async_trait]
pub trait StorageAuthority: Send + Sync {
    async fn new_registration(&self, reg: &NewRegistration) -> Result<Registration, RpcError>;

    async fn get_registration(&self, id: RegistrationId) -> Result<Registration, RpcError>;

    async fn new_pending_authorization(
        &self,
        authz: &Authorization,
    ) -> Result<Authorization, RpcError>;

    async fn get_authorization(&self, id: &str) -> Result<Authorization, RpcError>;

    async fn get_valid_authorization(
        &self,
        registration_id: RegistrationId,
        name: &str,
    ) -> Result<Option<Authorization>, RpcError>;

    async fn count_pending_authorizations(
        &self,
        registration_id: RegistrationId,
    ) -> Result<u64, RpcError>;

    async fn count_certificates_by_name(&self, name: &str) -> Result<u64, RpcError>;
}

/// A channel bound to one peer, with typed calls and per-method stats.
#[derive(Clone)]
pub struct PeerClient {
    peer: Peer,
    channel: Arc<dyn RpcChannel>,
    stats: StatsScope,
}

impl PeerClient {
    pub fn new(peer: Peer, channel: Arc<dyn RpcChannel>, stats: StatsScope) -> Self {
        Self {
            peer,
            channel,
            stats,
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    pub fn transport(&self) -> Transport {
        self.channel.transport()
    }

    async fn invoke<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, RpcError> {
        let started = Instant::now();
        let result = self.channel.call(method, body).await;
        self.stats.timing(&format!("{method}_latency"), started.elapsed());
        match result {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(e) => {
                self.stats.inc(&format!("{method}_errors"), 1);
                tracing::debug!(peer = %self.peer, method, error = %e, "Peer call failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerClient")
            .field("peer", &self.peer)
            .field("transport", &self.transport())
            .finish()
    }
}

#[async_trait]
impl ValidationAuthority for PeerClient {
    async fn update_validations(
        &self,
        authz: &Authorization,
        challenge_index: usize,
    ) -> Result<(), RpcError> {
        self.invoke::<Value>(
            "update_validations",
            json!({ "authz": authz, "challenge_index": challenge_index }),
        )
        .await
        .map(|_| ())
    }

    async fn is_safe_domain(&self, domain: &str) -> Result<bool, RpcError> {
        self.invoke("is_safe_domain", json!({ "domain": domain })).await
    }
}

#[async_trait]
impl CertificateAuthority for PeerClient {
    async fn issue_certificate(
        &self,
        csr: &CertificateRequest,
        registration_id: RegistrationId,
    ) -> Result<Certificate, RpcError> {
        self.invoke(
            "issue_certificate",
            json!({ "csr": csr, "registration_id": registration_id }),
        )
        .await
    }
}

#[async_trait]
impl StorageAuthority for PeerClient {
    async fn new_registration(&self, reg: &NewRegistration) -> Result<Registration, RpcError> {
        self.invoke("new_registration", serde_json::to_value(reg)?).await
    }

    async fn get_registration(&self, id: RegistrationId) -> Result<Registration, RpcError> {
        self.invoke("get_registration", json!({ "id": id })).await
    }

    async fn new_pending_authorization(
        &self,
        authz: &Authorization,
    ) -> Result<Authorization, RpcError> {
        self.invoke("new_pending_authorization", serde_json::to_value(authz)?)
            .await
    }

    async fn get_authorization(&self, id: &str) -> Result<Authorization, RpcError> {
        self.invoke("get_authorization", json!({ "id": id })).await
    }

    async fn get_valid_authorization(
        &self,
        registration_id: RegistrationId,
        name: &str,
    ) -> Result<Option<Authorization>, RpcError> {
        self.invoke(
            "get_valid_authorization",
            json!({ "registration_id": registration_id, "name": name }),
        )
        .await
    }

    async fn count_pending_authorizations(
        &self,
        registration_id: RegistrationId,
    ) -> Result<u64, RpcError> {
        self.invoke(
            "count_pending_authorizations",
            json!({ "registration_id": registration_id }),
        )
        .await
    }

    async fn count_certificates_by_name(&self, name: &str) -> Result<u64, RpcError> {
        self.invoke("count_certificates_by_name", json!({ "name": name }))
            .await
    }
}

#[derive(Debug, Error)]
#[error("unable to create {peer} client: {source}")]
pub struct PeerSetupError {
    pub peer: Peer,
    #[source]
    pub source: RpcError,
}

/// The three connected peer clients.
#[derive(Debug, Clone)]
pub struct PeerClients {
    pub va: PeerClient,
    pub ca: PeerClient,
    pub sa: PeerClient,
}

impl PeerClients {
    /// Connect Validation, then Certification, then Storage. The first
    /// failure aborts; no partial set is ever returned.
    pub async fn connect(
        client_name: &str,
        config: &RaConfig,
        stats: &StatsScope,
    ) -> Result<Self, PeerSetupError> {
        let legacy = TransportSelection::Legacy(config.amqp.clone());
        let va_selection = TransportSelection::select(config.va_service.as_ref(), &config.amqp);

        let va = connect_peer(client_name, Peer::Validation, &va_selection, stats).await?;
        let ca = connect_peer(client_name, Peer::Certification, &legacy, stats).await?;
        let sa = connect_peer(client_name, Peer::Storage, &legacy, stats).await?;

        Ok(Self { va, ca, sa })
    }
}

async fn connect_peer(
    client_name: &str,
    peer: Peer,
    selection: &TransportSelection,
    stats: &StatsScope,
) -> Result<PeerClient, PeerSetupError> {
    let stats = stats.scope("rpc").scope(peer.service_name());
    let channel = selection
        .connect(client_name, peer, stats.clone())
        .await
        .map_err(|source| PeerSetupError { peer, source })?;

    tracing::info!(peer = %peer, transport = %channel.transport(), "Peer client ready");
    Ok(PeerClient::new(peer, channel, stats))
}
