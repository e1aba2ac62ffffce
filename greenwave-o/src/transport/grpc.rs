/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! gRPC transport over the `exchange.v1.Exchange` service.
//!
//! Each process runs one tonic server carrying its registered handlers and
//! keeps a static route table (name prefix → peer endpoint) for outbound
//! polls.  Status codes map back onto [`PollOutcome`]:
//!
//! | server side | status | poller sees |
//! |---|---|---|
//! | no handler for the name | `NOT_FOUND` | `Nack` |
//! | handler dropped the request | `UNAVAILABLE` "dropped" | `Timeout` |
//! | deadline hit | `DEADLINE_EXCEEDED` / `CANCELLED` | `Timeout` |
//! | peer unreachable, anything else | other | `Nack` |

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tonic::transport::{Channel, Endpoint, Server};
use tonic::{Code, Request, Response, Status};
use tracing::{debug, info};

use super::{route, Payload, PollOutcome, RequestHandler, Transport, TransportError};
use crate::proto::exchange_v1::exchange_client::ExchangeClient;
use crate::proto::exchange_v1::exchange_server::{Exchange, ExchangeServer};
use crate::proto::exchange_v1::{PollReply, PollRequest};

const DROPPED: &str = "dropped";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

type HandlerTable = Arc<RwLock<Vec<(String, Arc<dyn RequestHandler>)>>>;

#[derive(Default)]
pub struct GrpcTransport {
    routes: Vec<(String, String)>,
    handlers: HandlerTable,
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends polls under `prefix` to the peer listening at `address`
    /// (`host:port`, or a full `http://` URI).
    pub fn with_route(mut self, prefix: impl Into<String>, address: &str) -> Self {
        let endpoint = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        self.routes.push((prefix.into(), endpoint));
        self
    }

    /// Serves registered handlers on `addr` until `shutdown` resolves.
    pub async fn serve<F>(&self, addr: SocketAddr, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()> + Send,
    {
        let service = ExchangeService {
            handlers: Arc::clone(&self.handlers),
        };
        info!(%addr, "Exchange service listening");
        Server::builder()
            .add_service(ExchangeServer::new(service))
            .serve_with_shutdown(addr, shutdown)
            .await?;
        info!(%addr, "Exchange service stopped");
        Ok(())
    }

    async fn channel(&self, endpoint: &str) -> Result<Channel, TransportError> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(endpoint) {
            return Ok(channel.clone());
        }
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(CONNECT_TIMEOUT)
            .connect_lazy();
        channels.insert(endpoint.to_string(), channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn register(
        &self,
        prefix: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), TransportError> {
        let mut handlers = self.handlers.write().await;
        if handlers.iter().any(|(p, _)| p == prefix) {
            return Err(TransportError::AlreadyRegistered(prefix.to_string()));
        }
        handlers.push((prefix.to_string(), handler));
        Ok(())
    }

    async fn poll(&self, name: &str, timeout: Duration) -> PollOutcome {
        let Some(endpoint) = route(&self.routes, name).cloned() else {
            return PollOutcome::Nack(String::from("no route"));
        };
        let channel = match self.channel(&endpoint).await {
            Ok(channel) => channel,
            Err(e) => return PollOutcome::Nack(e.to_string()),
        };

        let mut client = ExchangeClient::new(channel);
        let mut request = Request::new(PollRequest {
            name: name.to_string(),
        });
        request.set_timeout(timeout);

        match tokio::time::timeout(timeout, client.poll(request)).await {
            Err(_) => PollOutcome::Timeout,
            Ok(Ok(reply)) => {
                let reply = reply.into_inner();
                PollOutcome::Response(Payload {
                    content: reply.content,
                    freshness: Duration::from_millis(u64::from(reply.freshness_ms)),
                })
            }
            Ok(Err(status)) => outcome_from_status(&status),
        }
    }
}

fn outcome_from_status(status: &Status) -> PollOutcome {
    match status.code() {
        Code::DeadlineExceeded | Code::Cancelled => PollOutcome::Timeout,
        Code::Unavailable if status.message() == DROPPED => PollOutcome::Timeout,
        _ => {
            debug!(code = ?status.code(), message = status.message(), "Poll refused");
            PollOutcome::Nack(status.message().to_string())
        }
    }
}

// ── Server side ───────────────────────────────────────────────────────────────

struct ExchangeService {
    handlers: HandlerTable,
}

#[tonic::async_trait]
impl Exchange for ExchangeService {
    async fn poll(&self, request: Request<PollRequest>) -> Result<Response<PollReply>, Status> {
        let name = request.into_inner().name;
        let handler = {
            let handlers = self.handlers.read().await;
            route(&handlers, &name).cloned()
        };
        let Some(handler) = handler else {
            return Err(Status::not_found(format!("no handler for {name}")));
        };

        match handler.on_request(&name).await {
            Some(payload) => Ok(Response::new(PollReply {
                content: payload.content,
                freshness_ms: payload.freshness.as_millis().min(u128::from(u32::MAX)) as u32,
            })),
            None => Err(Status::unavailable(DROPPED)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_outcomes() {
        assert_eq!(
            outcome_from_status(&Status::not_found("no handler for /x")),
            PollOutcome::Nack("no handler for /x".into())
        );
        assert_eq!(
            outcome_from_status(&Status::unavailable(DROPPED)),
            PollOutcome::Timeout
        );
        assert_eq!(
            outcome_from_status(&Status::deadline_exceeded("late")),
            PollOutcome::Timeout
        );
        assert!(matches!(
            outcome_from_status(&Status::unavailable("connection refused")),
            PollOutcome::Nack(_)
        ));
    }

    #[tokio::test]
    async fn unrouted_poll_is_nacked() {
        let net = GrpcTransport::new().with_route("/central", "127.0.0.1:1");
        assert_eq!(
            net.poll("/tl/1", Duration::from_millis(50)).await,
            PollOutcome::Nack("no route".into())
        );
    }
}
