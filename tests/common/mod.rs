//! Shared utilities for integration testing.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use ra_node::rpc::broker::Frame;
use ra_node::rpc::RemoteError;

/// Peer state the fake broker answers from.
#[derive(Debug, Default)]
struct Peers {
    next_id: i64,
    registrations: Vec<Value>,
    authorizations: Vec<Value>,
}

impl Peers {
    fn handle(&mut self, method: &str, body: Value) -> Result<Value, RemoteError> {
        match method {
            "new_registration" => {
                self.next_id += 1;
                let mut reg = body;
                reg["id"] = json!(self.next_id);
                self.registrations.push(reg.clone());
                Ok(reg)
            }
            "get_registration" => self
                .registrations
                .iter()
                .find(|r| r["id"] == body["id"])
                .cloned()
                .ok_or_else(|| not_found("registration")),
            "new_pending_authorization" => {
                let mut authz = body;
                authz["id"] = json!(format!("authz-{}", self.authorizations.len() + 1));
                self.authorizations.push(authz.clone());
                Ok(authz)
            }
            "get_authorization" => self
                .authorizations
                .iter()
                .find(|a| a["id"] == body["id"])
                .cloned()
                .ok_or_else(|| not_found("authorization")),
            "get_valid_authorization" => Ok(Value::Null),
            "count_pending_authorizations" | "count_certificates_by_name" => Ok(json!(0)),
            "is_safe_domain" => Ok(json!(true)),
            "update_validations" => Ok(Value::Null),
            other => Err(RemoteError {
                kind: "unknown_method".into(),
                detail: other.to_string(),
            }),
        }
    }
}

fn not_found(what: &str) -> RemoteError {
    RemoteError {
        kind: "not_found".into(),
        detail: what.to_string(),
    }
}

/// A WebSocket message broker that answers every request itself.
pub struct FakeBroker {
    addr: SocketAddr,
    bound: Arc<Mutex<Vec<String>>>,
}

impl FakeBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bound = Arc::new(Mutex::new(Vec::new()));
        let peers = Arc::new(Mutex::new(Peers::default()));

        let accept_bound = bound.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let bound = accept_bound.clone();
                let peers = peers.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(message)) = ws.next().await {
                        let Message::Text(text) = message else {
                            continue;
                        };
                        let reply = match serde_json::from_str::<Frame>(text.as_str()) {
                            Ok(Frame::Bind { queue }) => {
                                bound.lock().unwrap().push(queue);
                                continue;
                            }
                            Ok(Frame::Request {
                                correlation_id,
                                method,
                                body,
                                ..
                            }) => {
                                let outcome = peers.lock().unwrap().handle(&method, body);
                                let (body, error) = match outcome {
                                    Ok(body) => (Some(body), None),
                                    Err(error) => (None, Some(error)),
                                };
                                Frame::Reply {
                                    correlation_id,
                                    body,
                                    error,
                                }
                            }
                            _ => continue,
                        };
                        let text = serde_json::to_string(&reply).unwrap();
                        if ws.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { addr, bound }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Reply queues bound so far.
    pub fn bound_queues(&self) -> Vec<String> {
        self.bound.lock().unwrap().clone()
    }

    /// Wait until at least `count` reply queues are bound.
    pub async fn wait_for_binds(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let queues = self.bound_queues();
            if queues.len() >= count {
                return queues;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.bound_queues()
    }
}

/// Config, hostname policy and rate-limit files for one node.
pub struct NodeFiles {
    pub config: NamedTempFile,
    pub hostnames: NamedTempFile,
    pub rate_limits: NamedTempFile,
}

impl NodeFiles {
    /// `extra` is appended verbatim to the generated config.
    pub fn new(broker_url: &str, extra: &str) -> Self {
        let mut hostnames = NamedTempFile::new().unwrap();
        write!(hostnames, r#"{{"blocked": ["blocked.test"]}}"#).unwrap();

        let mut rate_limits = NamedTempFile::new().unwrap();
        write!(
            rate_limits,
            r#"{{"pending_authorizations_per_account": {{"threshold": 10}}}}"#
        )
        .unwrap();

        let mut config = NamedTempFile::new().unwrap();
        write!(
            config,
            r#"
[ra]
listen_address = "127.0.0.1:0"
hostname_policy_file = {hostnames:?}
rate_limit_policies_file = {rate_limits:?}
max_concurrent_rpc_server_requests = 4
dns_tries = 0

[ra.amqp]
server = {broker_url:?}
timeout = "2s"
connect_attempts = 2
reconnect_base_ms = 10
reconnect_max_ms = 50

[pa.challenges]
"http-01" = true
"dns-01" = true

[common]
dns_resolver = "127.0.0.1:53"
dns_timeout = "1s"
dns_allow_loopback_addresses = true

{extra}
"#,
            hostnames = hostnames.path().display().to_string(),
            rate_limits = rate_limits.path().display().to_string(),
        )
        .unwrap();

        Self {
            config,
            hostnames,
            rate_limits,
        }
    }
}
