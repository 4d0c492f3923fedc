//! Objects exchanged between the RA, its peers, and its callers.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::policy::ChallengeType;

pub type RegistrationId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    /// Account key thumbprint.
    pub key: String,
    pub contact: Vec<String>,
    #[serde(default)]
    pub agreement: Option<String>,
}

/// A registration before storage has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    pub key: String,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default)]
    pub agreement: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub status: Status,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Empty until storage assigns one.
    #[serde(default)]
    pub id: String,
    pub identifier: String,
    pub registration_id: RegistrationId,
    pub status: Status,
    pub expires: SystemTime,
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    Rsa,
    EcdsaP256,
    EcdsaP384,
    EcdsaP521,
}

/// A certificate signing request as the RA sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub names: Vec<String>,
    #[serde(default)]
    pub common_name: Option<String>,
    pub key_algorithm: KeyAlgorithm,
    /// Base64 DER of the original CSR.
    pub csr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub serial: String,
    pub registration_id: RegistrationId,
    /// Base64 DER.
    pub der: String,
}
