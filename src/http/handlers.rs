//! Inbound RA operations.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ra::types::{
    Authorization, Certificate, CertificateRequest, NewRegistration, Registration, RegistrationId,
};
use crate::ra::{RaError, RegistrationAuthority};

pub type RaState = Arc<RegistrationAuthority>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthorizationRequest {
    pub registration_id: RegistrationId,
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAuthorizationRequest {
    pub authorization_id: String,
    pub challenge_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCertificateRequest {
    pub registration_id: RegistrationId,
    pub csr: CertificateRequest,
}

pub async fn new_registration(
    State(ra): State<RaState>,
    Json(req): Json<NewRegistration>,
) -> Result<Json<Registration>, RaError> {
    ra.new_registration(req).await.map(Json)
}

pub async fn new_authorization(
    State(ra): State<RaState>,
    Json(req): Json<NewAuthorizationRequest>,
) -> Result<Json<Authorization>, RaError> {
    ra.new_authorization(req.registration_id, &req.identifier)
        .await
        .map(Json)
}

pub async fn update_authorization(
    State(ra): State<RaState>,
    Json(req): Json<UpdateAuthorizationRequest>,
) -> Result<Json<Authorization>, RaError> {
    ra.update_authorization(&req.authorization_id, req.challenge_index)
        .await
        .map(Json)
}

pub async fn new_certificate(
    State(ra): State<RaState>,
    Json(req): Json<NewCertificateRequest>,
) -> Result<Json<Certificate>, RaError> {
    ra.new_certificate(req.registration_id, req.csr)
        .await
        .map(Json)
}
