//! Legacy message-broker transport.
//!
//! # Responsibilities
//! - Connect to the broker with bounded, jittered retries
//! - Bind a private reply queue named after the client identity
//! - Publish request frames to a peer's server queue
//! - Correlate reply frames with waiting callers
//!
//! # Design Decisions
//! - One writer task and one reader task per connection
//! - A lost connection fails every waiting call and every later call
//! - Calls time out individually; a late reply is dropped

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::config::{parse_duration, BrokerConfig};
use crate::observability::metrics::StatsScope;
use crate::resilience::Backoff;
use crate::rpc::channel::{RemoteError, RpcChannel, RpcError, Transport};

/// Wire frames exchanged with the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Declare the queue replies for this connection should be routed to.
    Bind { queue: String },
    Request {
        to: String,
        reply_to: String,
        correlation_id: String,
        client: String,
        method: String,
        body: Value,
    },
    Reply {
        correlation_id: String,
        #[serde(default)]
        body: Option<Value>,
        #[serde(default)]
        error: Option<RemoteError>,
    },
}

type PendingReplies = DashMap<String, oneshot::Sender<Result<Value, RemoteError>>>;

pub struct BrokerChannel {
    client_name: String,
    server_queue: String,
    reply_queue: String,
    outbound: mpsc::UnboundedSender<Message>,
    pending: Arc<PendingReplies>,
    closed: Arc<AtomicBool>,
    timeout: Duration,
    stats: StatsScope,
}

impl BrokerChannel {
    /// Connect to the broker and bind a reply queue for calls to `server_queue`.
    pub async fn connect(
        client_name: &str,
        server_queue: &str,
        config: &BrokerConfig,
        stats: StatsScope,
    ) -> Result<Self, RpcError> {
        let timeout =
            parse_duration(&config.timeout).map_err(|e| RpcError::Config(e.to_string()))?;

        let mut backoff = Backoff::new(
            config.connect_attempts,
            config.reconnect_base_ms,
            config.reconnect_max_ms,
        );
        let mut last_error = String::from("no connection attempts made");
        let stream = loop {
            let Some(delay) = backoff.next_delay() else {
                return Err(RpcError::Connect {
                    target: config.server.clone(),
                    reason: last_error,
                });
            };
            tokio::time::sleep(delay).await;

            match connect_async(config.server.as_str()).await {
                Ok((stream, _)) => break stream,
                Err(e) => {
                    tracing::warn!(
                        server = %config.server,
                        attempt = backoff.attempt(),
                        error = %e,
                        "Broker connection attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        };

        let (mut sink, mut source) = stream.split();
        let reply_queue = format!("{}.{}.{}", server_queue, client_name, Uuid::new_v4().simple());

        let bind = serde_json::to_string(&Frame::Bind {
            queue: reply_queue.clone(),
        })?;
        sink.send(Message::Text(bind.into()))
            .await
            .map_err(|e| RpcError::Connect {
                target: config.server.clone(),
                reason: e.to_string(),
            })?;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "Broker write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pending: Arc<PendingReplies> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        let reader_queue = reply_queue.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => dispatch_reply(&reader_pending, text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(queue = %reader_queue, error = %e, "Broker read failed");
                        break;
                    }
                }
            }
            // Callers see `closed` before their waiters are dropped.
            reader_closed.store(true, Ordering::SeqCst);
            reader_pending.clear();
            tracing::warn!(queue = %reader_queue, "Broker connection closed");
        });

        tracing::info!(
            server = %config.server,
            server_queue,
            reply_queue = %reply_queue,
            "Broker channel connected"
        );

        Ok(Self {
            client_name: client_name.to_string(),
            server_queue: server_queue.to_string(),
            reply_queue,
            outbound,
            pending,
            closed,
            timeout,
            stats,
        })
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }
}

fn dispatch_reply(pending: &PendingReplies, text: &str) {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Reply {
            correlation_id,
            body,
            error,
        }) => {
            let Some((_, waiter)) = pending.remove(&correlation_id) else {
                tracing::debug!(correlation_id = %correlation_id, "Dropping reply with no waiter");
                return;
            };
            let outcome = match error {
                Some(remote) => Err(remote),
                None => Ok(body.unwrap_or(Value::Null)),
            };
            let _ = waiter.send(outcome);
        }
        Ok(other) => tracing::debug!(frame = ?other, "Ignoring unexpected broker frame"),
        Err(e) => tracing::warn!(error = %e, "Malformed broker frame"),
    }
}

#[async_trait]
impl RpcChannel for BrokerChannel {
    async fn call(&self, method: &str, body: Value) -> Result<Value, RpcError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::Closed);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&Frame::Request {
            to: self.server_queue.clone(),
            reply_to: self.reply_queue.clone(),
            correlation_id: correlation_id.clone(),
            client: self.client_name.clone(),
            method: method.to_string(),
            body,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);
        // The reader may have cleared `pending` since the check above.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&correlation_id);
            return Err(RpcError::Closed);
        }
        if self.outbound.send(Message::Text(frame.into())).is_err() {
            self.pending.remove(&correlation_id);
            return Err(RpcError::Closed);
        }
        self.stats.inc("calls", 1);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(remote))) => Err(RpcError::Remote(remote)),
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                self.pending.remove(&correlation_id);
                self.stats.inc("timeouts", 1);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    fn transport(&self) -> Transport {
        Transport::Legacy
    }
}

impl std::fmt::Debug for BrokerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerChannel")
            .field("server_queue", &self.server_queue)
            .field("reply_queue", &self.reply_queue)
            .field("timeout", &self.timeout)
            .finish()
    }
}
