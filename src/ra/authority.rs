//! The registration authority handle.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AllowedSigningAlgos;
use crate::dns::Resolver;
use crate::policy::{IdentifierError, PolicyAuthority};
use crate::ra::rate_limit::RateLimitPolicies;
use crate::ra::types::{
    Authorization, Certificate, CertificateRequest, Challenge, KeyAlgorithm, NewRegistration,
    Registration, RegistrationId, Status,
};
use crate::rpc::{CertificateAuthority, RpcError, StorageAuthority, ValidationAuthority};

/// Lifetime of a freshly created pending authorization.
pub const PENDING_AUTHORIZATION_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum RaError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("invalid contact: {0}")]
    InvalidContact(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("policy forbids {name}: {source}")]
    Policy {
        name: String,
        #[source]
        source: IdentifierError,
    },
    #[error("peer call failed: {0}")]
    Peer(#[from] RpcError),
}

/// Key algorithms accepted in certificate requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPolicy {
    algos: AllowedSigningAlgos,
}

impl KeyPolicy {
    pub fn new(algos: Option<AllowedSigningAlgos>) -> Self {
        Self {
            algos: algos.unwrap_or_default(),
        }
    }

    pub fn allows(&self, algorithm: KeyAlgorithm) -> bool {
        match algorithm {
            KeyAlgorithm::Rsa => self.algos.rsa,
            KeyAlgorithm::EcdsaP256 => self.algos.ecdsa_nist_p256,
            KeyAlgorithm::EcdsaP384 => self.algos.ecdsa_nist_p384,
            KeyAlgorithm::EcdsaP521 => self.algos.ecdsa_nist_p521,
        }
    }
}

/// Tunables of the RA core.
#[derive(Debug, Clone)]
pub struct RaSettings {
    /// 0 = unbounded.
    pub max_contacts_per_registration: usize,
    pub key_policy: KeyPolicy,
    /// 0 = unbounded.
    pub max_names: usize,
    pub force_cn: bool,
    pub reuse_valid_authz: bool,
    pub use_is_safe_domain: bool,
    pub rate_limits: RateLimitPolicies,
}

/// Every collaborator the RA needs, supplied together.
pub struct Dependencies {
    pub policy: Arc<PolicyAuthority>,
    pub resolver: Arc<dyn Resolver>,
    pub va: Arc<dyn ValidationAuthority>,
    pub ca: Arc<dyn CertificateAuthority>,
    pub sa: Arc<dyn StorageAuthority>,
}

pub struct RegistrationAuthority {
    settings: RaSettings,
    deps: Dependencies,
    clock: Arc<dyn Clock>,
}

impl RegistrationAuthority {
    pub fn new(settings: RaSettings, deps: Dependencies, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            deps,
            clock,
        }
    }

    pub fn settings(&self) -> &RaSettings {
        &self.settings
    }

    pub async fn new_registration(&self, req: NewRegistration) -> Result<Registration, RaError> {
        if req.key.trim().is_empty() {
            return Err(RaError::Malformed("registration has no key".into()));
        }
        let max = self.settings.max_contacts_per_registration;
        if max > 0 && req.contact.len() > max {
            return Err(RaError::Malformed(format!(
                "too many contacts provided: {} > {}",
                req.contact.len(),
                max
            )));
        }
        for contact in &req.contact {
            self.validate_contact(contact).await?;
        }

        let reg = self.deps.sa.new_registration(&req).await?;
        tracing::info!(registration_id = reg.id, "Registration created");
        Ok(reg)
    }

    async fn validate_contact(&self, contact: &str) -> Result<(), RaError> {
        let (scheme, value) = contact
            .split_once(':')
            .ok_or_else(|| RaError::InvalidContact(format!("{contact:?} has no scheme")))?;
        match scheme {
            "tel" => Ok(()),
            "mailto" => {
                let domain = match value.split('@').collect::<Vec<_>>().as_slice() {
                    [local, domain] if !local.is_empty() && !domain.is_empty() => *domain,
                    _ => {
                        return Err(RaError::InvalidContact(format!(
                            "{value:?} is not a valid e-mail address"
                        )))
                    }
                };
                match self.deps.resolver.lookup_host(domain).await {
                    Ok(addrs) if !addrs.is_empty() => Ok(()),
                    Ok(_) => Err(RaError::InvalidContact(format!(
                        "{domain} has no usable addresses"
                    ))),
                    Err(e) => Err(RaError::InvalidContact(format!("{value}: {e}"))),
                }
            }
            other => Err(RaError::InvalidContact(format!(
                "contact method {other} is not supported"
            ))),
        }
    }

    pub async fn new_authorization(
        &self,
        registration_id: RegistrationId,
        identifier: &str,
    ) -> Result<Authorization, RaError> {
        let name = identifier.trim_end_matches('.').to_ascii_lowercase();
        self.check_policy(&name)?;
        self.deps.sa.get_registration(registration_id).await?;

        if self.settings.use_is_safe_domain && !self.deps.va.is_safe_domain(&name).await? {
            return Err(RaError::Unauthorized(format!(
                "{name} was considered an unsafe domain by a third-party API"
            )));
        }

        let now = self.clock.now();
        if self.settings.reuse_valid_authz {
            if let Some(existing) = self
                .deps
                .sa
                .get_valid_authorization(registration_id, &name)
                .await?
            {
                if existing.expires > now {
                    tracing::debug!(authz = %existing.id, "Reusing valid authorization");
                    return Ok(existing);
                }
            }
        }

        let pending_limit = self.settings.rate_limits.pending_authorizations_per_account;
        if pending_limit.enabled() {
            let pending = self
                .deps
                .sa
                .count_pending_authorizations(registration_id)
                .await?;
            if pending_limit.exceeded_by(pending) {
                return Err(RaError::RateLimited(
                    "too many currently pending authorizations".into(),
                ));
            }
        }

        let challenges = self
            .deps
            .policy
            .challenges_for(&name)
            .into_iter()
            .map(|challenge_type| Challenge {
                challenge_type,
                status: Status::Pending,
                token: Uuid::new_v4().simple().to_string(),
            })
            .collect();

        let authz = Authorization {
            id: String::new(),
            identifier: name,
            registration_id,
            status: Status::Pending,
            expires: now + PENDING_AUTHORIZATION_LIFETIME,
            challenges,
        };
        Ok(self.deps.sa.new_pending_authorization(&authz).await?)
    }

    pub async fn update_authorization(
        &self,
        authz_id: &str,
        challenge_index: usize,
    ) -> Result<Authorization, RaError> {
        let mut authz = self.deps.sa.get_authorization(authz_id).await?;
        if authz.status != Status::Pending {
            return Err(RaError::Malformed(format!(
                "authorization {authz_id} is not pending"
            )));
        }
        if authz.expires <= self.clock.now() {
            return Err(RaError::Malformed(format!(
                "authorization {authz_id} has expired"
            )));
        }
        let Some(challenge) = authz.challenges.get_mut(challenge_index) else {
            return Err(RaError::Malformed(format!(
                "challenge index {challenge_index} out of range"
            )));
        };
        challenge.status = Status::Processing;

        self.deps.va.update_validations(&authz, challenge_index).await?;
        Ok(authz)
    }

    pub async fn new_certificate(
        &self,
        registration_id: RegistrationId,
        mut csr: CertificateRequest,
    ) -> Result<Certificate, RaError> {
        let mut names: Vec<String> = csr
            .names
            .iter()
            .map(|n| n.trim_end_matches('.').to_ascii_lowercase())
            .collect();
        names.sort();
        names.dedup();

        if names.is_empty() {
            return Err(RaError::Malformed("CSR has no names".into()));
        }
        let max = self.settings.max_names;
        if max > 0 && names.len() > max {
            return Err(RaError::Malformed(format!(
                "CSR has too many names: {} > {}",
                names.len(),
                max
            )));
        }
        if !self.settings.key_policy.allows(csr.key_algorithm) {
            return Err(RaError::Malformed(format!(
                "key algorithm {:?} is not allowed",
                csr.key_algorithm
            )));
        }

        let common_name = csr
            .common_name
            .as_ref()
            .map(|cn| cn.trim_end_matches('.').to_ascii_lowercase());
        match common_name {
            Some(cn) if names.contains(&cn) => csr.common_name = Some(cn),
            Some(cn) if !self.settings.force_cn => {
                return Err(RaError::Malformed(format!(
                    "common name {cn} is not among the requested names"
                )))
            }
            _ if self.settings.force_cn => csr.common_name = Some(names[0].clone()),
            _ => {}
        }

        let now = self.clock.now();
        let mut missing = Vec::new();
        for name in &names {
            self.check_policy(name)?;
            match self
                .deps
                .sa
                .get_valid_authorization(registration_id, name)
                .await?
            {
                Some(authz) if authz.expires > now => {}
                _ => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(RaError::Unauthorized(format!(
                "authorizations for these names not found or expired: {}",
                missing.join(", ")
            )));
        }

        let per_name = self.settings.rate_limits.certificates_per_name;
        if per_name.enabled() {
            for name in &names {
                let issued = self.deps.sa.count_certificates_by_name(name).await?;
                if per_name.exceeded_by(issued) {
                    return Err(RaError::RateLimited(format!(
                        "too many certificates already issued for {name}"
                    )));
                }
            }
        }

        csr.names = names;
        let cert = self.deps.ca.issue_certificate(&csr, registration_id).await?;
        tracing::info!(registration_id, serial = %cert.serial, "Certificate issued");
        Ok(cert)
    }

    fn check_policy(&self, name: &str) -> Result<(), RaError> {
        self.deps
            .policy
            .will_issue_for(name)
            .map_err(|source| RaError::Policy {
                name: name.to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for RegistrationAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationAuthority")
            .field("settings", &self.settings)
            .finish()
    }
}
