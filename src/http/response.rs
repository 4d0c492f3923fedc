//! Mapping of RA failures onto HTTP responses.
//!
//! Error bodies share the `{ "kind", "detail" }` shape peers use, so a
//! caller speaking the modern transport decodes them the same way.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::ra::RaError;
use crate::rpc::{RemoteError, RpcError};

fn status_and_kind(err: &RaError) -> (StatusCode, String) {
    match err {
        RaError::Malformed(_) => (StatusCode::BAD_REQUEST, "malformed".into()),
        RaError::InvalidContact(_) => (StatusCode::BAD_REQUEST, "invalid_contact".into()),
        RaError::Policy { .. } => (StatusCode::BAD_REQUEST, "rejected_identifier".into()),
        RaError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized".into()),
        RaError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited".into()),
        RaError::Peer(RpcError::Remote(remote)) if remote.kind == "not_found" => {
            (StatusCode::NOT_FOUND, remote.kind.clone())
        }
        RaError::Peer(RpcError::Remote(remote)) => (StatusCode::BAD_GATEWAY, remote.kind.clone()),
        RaError::Peer(RpcError::Timeout { .. }) => {
            (StatusCode::GATEWAY_TIMEOUT, "peer_timeout".into())
        }
        RaError::Peer(_) => (StatusCode::BAD_GATEWAY, "peer_unavailable".into()),
    }
}

impl IntoResponse for RaError {
    fn into_response(self) -> Response {
        let (status, kind) = status_and_kind(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (
            status,
            Json(RemoteError {
                kind,
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
