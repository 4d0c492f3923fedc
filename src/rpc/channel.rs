//! Transport-neutral request/response channel to one peer service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Which RPC mechanism a channel rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Endpoint-descriptor based request/response.
    Modern,
    /// Message-broker based request/reply.
    Legacy,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Modern => f.write_str("modern"),
            Transport::Legacy => f.write_str("legacy"),
        }
    }
}

/// Error reported by the remote service itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {detail}")]
pub struct RemoteError {
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid transport configuration: {0}")]
    Config(String),
    #[error("connecting to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("{method} timed out")]
    Timeout { method: String },
    #[error("transport failure during {method}: {reason}")]
    Transport { method: String, reason: String },
    #[error("channel closed")]
    Closed,
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("remote error: {0}")]
    Remote(RemoteError),
}

/// A connected channel. Requests and responses are JSON documents; the
/// method name selects the operation on the peer.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    async fn call(&self, method: &str, body: Value) -> Result<Value, RpcError>;

    fn transport(&self) -> Transport;
}
