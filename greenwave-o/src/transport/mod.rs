/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Named request/response transport.
//!
//! Every exchange is a pull: a caller polls a hierarchical name and gets
//! back exactly one of
//!
//! | outcome | meaning |
//! |---|---|
//! | [`PollOutcome::Response`] | the owner of the name answered |
//! | [`PollOutcome::Nack`] | nobody can serve the name (no route, refused) |
//! | [`PollOutcome::Timeout`] | no answer within the deadline |
//!
//! A handler is registered under a name prefix and receives every poll
//! whose name equals the prefix or continues it with `/`.  When several
//! prefixes match, the longest wins.
//!
//! Two implementations ship with the crate:
//! * [`MemoryTransport`] – in-process, with fault injection for tests and
//!   the grid simulator.
//! * [`GrpcTransport`] – tonic `Exchange` service between processes.

mod grpc;
mod memory;

pub use grpc::GrpcTransport;
pub use memory::{Fault, MemoryTransport};

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Freshness hint attached to every answer: data older than this should
/// not be served from a cache.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content: Vec<u8>,
    pub freshness: Duration,
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into().into_bytes(),
            freshness: DEFAULT_FRESHNESS,
        }
    }

    /// Content as UTF-8, with invalid sequences replaced.
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Response(Payload),
    Nack(String),
    Timeout,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("name '{0}' already has a handler")]
    AlreadyRegistered(String),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("transport server failed: {0}")]
    Serve(#[from] tonic::transport::Error),
}

/// Answers polls for a registered name prefix.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// `None` drops the request; the poller observes a timeout.
    async fn on_request(&self, name: &str) -> Option<Payload>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn register(
        &self,
        prefix: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), TransportError>;

    /// Never fails: every transport problem is folded into the outcome.
    async fn poll(&self, name: &str, timeout: Duration) -> PollOutcome;
}

// ── Prefix routing ────────────────────────────────────────────────────────────

/// `true` when `name` is `prefix` itself or lies below it.
pub(crate) fn prefix_matches(prefix: &str, name: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// Longest-prefix lookup over a small routing table.
pub(crate) fn route<'a, V>(table: &'a [(String, V)], name: &str) -> Option<&'a V> {
    table
        .iter()
        .filter(|(prefix, _)| prefix_matches(prefix, name))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, v)| v)
}
