/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-process transport with fault injection.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{route, PollOutcome, RequestHandler, Transport, TransportError};

/// Failure applied to every poll whose name falls under the injected prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Swallow the request; the poller times out.
    Drop,
    /// Refuse with the given reason.
    Nack(String),
    /// Deliver after an extra delay (times out if the delay exceeds it).
    Delay(Duration),
}

#[derive(Default)]
struct Inner {
    handlers: RwLock<Vec<(String, Arc<dyn RequestHandler>)>>,
    faults: RwLock<Vec<(String, Fault)>>,
}

/// Cloneable handle; every clone shares the same routing table.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) a fault for `prefix`.
    pub async fn inject(&self, prefix: &str, fault: Fault) {
        let mut faults = self.inner.faults.write().await;
        faults.retain(|(p, _)| p != prefix);
        debug!(prefix, ?fault, "Fault injected");
        faults.push((prefix.to_string(), fault));
    }

    pub async fn clear(&self, prefix: &str) {
        self.inner.faults.write().await.retain(|(p, _)| p != prefix);
        debug!(prefix, "Fault cleared");
    }

    async fn dispatch(&self, name: &str, timeout: Duration) -> PollOutcome {
        let handler = {
            let handlers = self.inner.handlers.read().await;
            route(&handlers, name).cloned()
        };
        let Some(handler) = handler else {
            return PollOutcome::Nack(String::from("no route"));
        };

        let answer = async {
            match handler.on_request(name).await {
                Some(payload) => payload,
                None => future::pending().await,
            }
        };
        match tokio::time::timeout(timeout, answer).await {
            Ok(payload) => PollOutcome::Response(payload),
            Err(_) => PollOutcome::Timeout,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn register(
        &self,
        prefix: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), TransportError> {
        let mut handlers = self.inner.handlers.write().await;
        if handlers.iter().any(|(p, _)| p == prefix) {
            return Err(TransportError::AlreadyRegistered(prefix.to_string()));
        }
        handlers.push((prefix.to_string(), handler));
        Ok(())
    }

    async fn poll(&self, name: &str, timeout: Duration) -> PollOutcome {
        let fault = {
            let faults = self.inner.faults.read().await;
            route(&faults, name).cloned()
        };

        match fault {
            None => self.dispatch(name, timeout).await,
            Some(Fault::Nack(reason)) => PollOutcome::Nack(reason),
            Some(Fault::Drop) => {
                tokio::time::sleep(timeout).await;
                PollOutcome::Timeout
            }
            Some(Fault::Delay(delay)) if delay >= timeout => {
                tokio::time::sleep(timeout).await;
                PollOutcome::Timeout
            }
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                self.dispatch(name, timeout - delay).await
            }
        }
    }
}
