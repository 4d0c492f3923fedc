//! In-memory peers and fixtures shared by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::clock::FakeClock;
use crate::config::AllowedSigningAlgos;
use crate::dns::{DnsError, Resolver};
use crate::policy::PolicyAuthority;
use crate::ra::types::{
    Authorization, Certificate, CertificateRequest, NewRegistration, Registration, RegistrationId,
    Status,
};
use crate::ra::{Dependencies, KeyPolicy, RaSettings, RateLimitPolicies, RegistrationAuthority};
use crate::rpc::{
    CertificateAuthority, RemoteError, RpcError, StorageAuthority, ValidationAuthority,
};

#[derive(Debug, Default)]
struct PeerState {
    next_registration: RegistrationId,
    next_authz: u64,
    registrations: HashMap<RegistrationId, Registration>,
    authorizations: HashMap<String, Authorization>,
    validations: Vec<(String, usize)>,
    issued: Vec<CertificateRequest>,
}

/// Validation, certification and storage peers backed by one shared map.
#[derive(Debug, Clone)]
pub struct FakePeers {
    state: Arc<Mutex<PeerState>>,
    hold: Option<Arc<Notify>>,
}

impl Default for FakePeers {
    fn default() -> Self {
        let mut state = PeerState {
            next_registration: 2,
            ..PeerState::default()
        };
        state.registrations.insert(
            1,
            Registration {
                id: 1,
                key: "seed".into(),
                contact: vec![],
                agreement: None,
            },
        );
        Self {
            state: Arc::new(Mutex::new(state)),
            hold: None,
        }
    }
}

impl FakePeers {
    /// Storage calls to `new_registration` park until `hold` is notified.
    pub fn holding(hold: Arc<Notify>) -> Self {
        Self {
            hold: Some(hold),
            ..Self::default()
        }
    }

    pub fn validate(&self, authz_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(authz) = state.authorizations.get_mut(authz_id) {
            authz.status = Status::Valid;
        }
    }

    pub fn validations(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().validations.clone()
    }

    pub fn issued(&self) -> Vec<CertificateRequest> {
        self.state.lock().unwrap().issued.clone()
    }
}

fn not_found(what: &str) -> RpcError {
    RpcError::Remote(RemoteError {
        kind: "not_found".into(),
        detail: what.to_string(),
    })
}

#[async_trait]
impl ValidationAuthority for FakePeers {
    async fn update_validations(
        &self,
        authz: &Authorization,
        challenge_index: usize,
    ) -> Result<(), RpcError> {
        self.state
            .lock()
            .unwrap()
            .validations
            .push((authz.id.clone(), challenge_index));
        Ok(())
    }

    async fn is_safe_domain(&self, domain: &str) -> Result<bool, RpcError> {
        Ok(!domain.starts_with("unsafe."))
    }
}

#[async_trait]
impl CertificateAuthority for FakePeers {
    async fn issue_certificate(
        &self,
        csr: &CertificateRequest,
        registration_id: RegistrationId,
    ) -> Result<Certificate, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.issued.push(csr.clone());
        Ok(Certificate {
            serial: format!("{:032x}", state.issued.len()),
            registration_id,
            der: "MIIC".into(),
        })
    }
}

#[async_trait]
impl StorageAuthority for FakePeers {
    async fn new_registration(&self, reg: &NewRegistration) -> Result<Registration, RpcError> {
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_registration;
        state.next_registration += 1;
        let stored = Registration {
            id,
            key: reg.key.clone(),
            contact: reg.contact.clone(),
            agreement: reg.agreement.clone(),
        };
        state.registrations.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_registration(&self, id: RegistrationId) -> Result<Registration, RpcError> {
        self.state
            .lock()
            .unwrap()
            .registrations
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("registration"))
    }

    async fn new_pending_authorization(
        &self,
        authz: &Authorization,
    ) -> Result<Authorization, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.next_authz += 1;
        let mut stored = authz.clone();
        stored.id = format!("authz-{}", state.next_authz);
        state
            .authorizations
            .insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_authorization(&self, id: &str) -> Result<Authorization, RpcError> {
        self.state
            .lock()
            .unwrap()
            .authorizations
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("authorization"))
    }

    async fn get_valid_authorization(
        &self,
        registration_id: RegistrationId,
        name: &str,
    ) -> Result<Option<Authorization>, RpcError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .authorizations
            .values()
            .filter(|a| {
                a.registration_id == registration_id
                    && a.identifier == name
                    && a.status == Status::Valid
            })
            .max_by_key(|a| a.expires)
            .cloned())
    }

    async fn count_pending_authorizations(
        &self,
        registration_id: RegistrationId,
    ) -> Result<u64, RpcError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .authorizations
            .values()
            .filter(|a| a.registration_id == registration_id && a.status == Status::Pending)
            .count() as u64)
    }

    async fn count_certificates_by_name(&self, name: &str) -> Result<u64, RpcError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .issued
            .iter()
            .filter(|csr| csr.names.iter().any(|n| n == name))
            .count() as u64)
    }
}

/// Resolves everything to a documentation address except `*.unresolvable.test`.
#[derive(Debug, Default)]
pub struct FakeResolver;

#[async_trait]
impl Resolver for FakeResolver {
    async fn lookup_host(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        if hostname.ends_with("unresolvable.test") {
            return Err(DnsError::Permanent {
                hostname: hostname.to_string(),
                reason: "NXDOMAIN".into(),
            });
        }
        Ok(vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))])
    }
}

pub fn hostname_policy_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"blocked": ["blocked.test"]}}"#).unwrap();
    file
}

pub fn test_policy(path: &std::path::Path) -> Arc<PolicyAuthority> {
    let challenges = [("http-01", true), ("dns-01", true), ("tls-sni-01", false)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Arc::new(PolicyAuthority::new(&challenges, path).unwrap())
}

pub fn test_settings() -> RaSettings {
    RaSettings {
        max_contacts_per_registration: 100,
        key_policy: KeyPolicy::new(Some(AllowedSigningAlgos::default())),
        max_names: 100,
        force_cn: true,
        reuse_valid_authz: true,
        use_is_safe_domain: false,
        rate_limits: RateLimitPolicies::default(),
    }
}

pub struct Fixture {
    pub ra: RegistrationAuthority,
    pub settings: RaSettings,
    pub peers: FakePeers,
    pub clock: Arc<FakeClock>,
    policy: Arc<PolicyAuthority>,
    _policy_file: tempfile::NamedTempFile,
}

impl Fixture {
    /// A fresh RA over the same peers and policy using the current settings.
    pub fn rebuild(&self) -> RegistrationAuthority {
        build(&self.settings, &self.peers, &self.policy, &self.clock)
    }
}

fn build(
    settings: &RaSettings,
    peers: &FakePeers,
    policy: &Arc<PolicyAuthority>,
    clock: &Arc<FakeClock>,
) -> RegistrationAuthority {
    RegistrationAuthority::new(
        settings.clone(),
        Dependencies {
            policy: policy.clone(),
            resolver: Arc::new(FakeResolver),
            va: Arc::new(peers.clone()),
            ca: Arc::new(peers.clone()),
            sa: Arc::new(peers.clone()),
        },
        clock.clone(),
    )
}

pub fn fixture(peers: FakePeers) -> Fixture {
    let policy_file = hostname_policy_file();
    let policy = test_policy(policy_file.path());
    let clock = Arc::new(FakeClock::default());
    let settings = test_settings();
    Fixture {
        ra: build(&settings, &peers, &policy, &clock),
        settings,
        peers,
        clock,
        policy,
        _policy_file: policy_file,
    }
}
