//! Inbound RPC server setup.
//!
//! # Responsibilities
//! - Create the Axum router exposing the RA operations
//! - Wire up middleware (tracing, request ID, body limit, timeout, admission)
//! - Bind the listen address and serve until shutdown
//!
//! # Design Decisions
//! - Binding and serving are separate steps so a bind failure surfaces
//!   before anything is reported as serving
//! - Admission runs innermost; a rejection is decided before any handler work

use axum::{middleware, routing::post, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::admission::{admit, Admission};
use crate::http::handlers;
use crate::observability::metrics::StatsScope;
use crate::ra::RegistrationAuthority;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The RA's inbound endpoint, built but not yet bound.
pub struct InboundServer {
    router: Router,
    admission: Admission,
}

impl InboundServer {
    pub fn new(
        ra: Arc<RegistrationAuthority>,
        max_concurrent_requests: usize,
        request_timeout: Duration,
        stats: StatsScope,
    ) -> Self {
        let admission = Admission::new(max_concurrent_requests, stats);
        let router = Self::build_router(ra, admission.clone(), request_timeout);
        Self { router, admission }
    }

    #[allow(deprecated)]
    fn build_router(
        ra: Arc<RegistrationAuthority>,
        admission: Admission,
        request_timeout: Duration,
    ) -> Router {
        Router::new()
            .route("/ra/new-registration", post(handlers::new_registration))
            .route("/ra/new-authorization", post(handlers::new_authorization))
            .route("/ra/update-authorization", post(handlers::update_authorization))
            .route("/ra/new-certificate", post(handlers::new_certificate))
            .with_state(ra)
            .layer(middleware::from_fn_with_state(admission, admit))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub async fn bind(self, addr: &str) -> Result<BoundServer, ServerError> {
        let parsed: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
            ServerError::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        let listener = TcpListener::bind(parsed)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            max_concurrent_requests = self.admission.limit(),
            "Inbound server bound"
        );
        Ok(BoundServer {
            listener,
            router: self.router,
            local_addr,
        })
    }
}

/// A bound listener ready to serve.
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(address = %self.local_addr, "Inbound server serving");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Inbound server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, FakePeers};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn post_json(path: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn server(peers: FakePeers, limit: usize) -> InboundServer {
        let ra = Arc::new(fixture(peers).ra);
        InboundServer::new(ra, limit, Duration::from_secs(5), StatsScope::new("t"))
    }

    #[tokio::test]
    async fn registration_round_trip() {
        let server = server(FakePeers::default(), 4);
        let response = server
            .router()
            .oneshot(post_json(
                "/ra/new-registration",
                json!({ "key": "thumb", "contact": ["tel:+15555550100"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = body_json(response).await;
        assert_eq!(body["key"], "thumb");
    }

    #[tokio::test]
    async fn ra_errors_map_to_status_codes() {
        let server = server(FakePeers::default(), 4);
        let response = server
            .router()
            .oneshot(post_json(
                "/ra/new-authorization",
                json!({ "registration_id": 1, "identifier": "x.blocked.test" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "rejected_identifier");

        let response = server
            .router()
            .oneshot(post_json(
                "/ra/update-authorization",
                json!({ "authorization_id": "missing", "challenge_index": 0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn requests_above_ceiling_are_rejected() {
        let hold = Arc::new(Notify::new());
        let server = server(FakePeers::holding(hold.clone()), 1);
        let admission = server.admission().clone();

        let first = tokio::spawn(
            server
                .router()
                .oneshot(post_json("/ra/new-registration", json!({ "key": "a" }))),
        );
        while admission.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let rejected = server
            .router()
            .oneshot(post_json("/ra/new-registration", json!({ "key": "b" })))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(rejected).await["kind"], "overloaded");

        hold.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(admission.in_flight(), 0);
    }

    #[tokio::test]
    async fn bind_reports_bad_addresses() {
        let err = server(FakePeers::default(), 0)
            .bind("not-an-address")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress { .. }));

        let bound = server(FakePeers::default(), 0)
            .bind("127.0.0.1:0")
            .await
            .unwrap();
        assert_ne!(bound.local_addr().port(), 0);
    }
}
