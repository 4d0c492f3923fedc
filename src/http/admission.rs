//! Concurrency ceiling for inbound requests.
//!
//! # Design Decisions
//! - A request that finds no free permit is rejected with 503 immediately,
//!   never queued
//! - A limit of 0 installs no semaphore at all

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::observability::metrics::StatsScope;
use crate::rpc::RemoteError;

#[derive(Debug, Clone)]
pub struct Admission {
    permits: Option<Arc<Semaphore>>,
    limit: usize,
    stats: StatsScope,
}

impl Admission {
    pub fn new(limit: usize, stats: StatsScope) -> Self {
        let permits = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        Self {
            permits,
            limit,
            stats,
        }
    }

    /// Configured ceiling; 0 = unbounded.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.permits
            .as_ref()
            .map(|p| self.limit - p.available_permits())
            .unwrap_or(0)
    }
}

pub async fn admit(State(admission): State<Admission>, req: Request, next: Next) -> Response {
    let Some(permits) = &admission.permits else {
        return next.run(req).await;
    };

    match permits.clone().try_acquire_owned() {
        Ok(permit) => {
            admission.stats.gauge("in_flight", admission.in_flight() as f64);
            let response = next.run(req).await;
            drop(permit);
            response
        }
        Err(_) => {
            admission.stats.inc("rejected", 1);
            tracing::warn!(
                limit = admission.limit,
                path = %req.uri().path(),
                "Concurrency ceiling reached, rejecting request"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RemoteError {
                    kind: "overloaded".into(),
                    detail: format!("more than {} requests in flight", admission.limit),
                }),
            )
                .into_response()
        }
    }
}
