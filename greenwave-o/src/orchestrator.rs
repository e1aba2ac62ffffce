/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Orchestrator runtime.
//!
//! Wraps a [`Coordinator`] in one `tokio::sync::Mutex` shared by three
//! activities:
//!
//! ```text
//!   cycle task ──── tick() every poll interval
//!   poll loop  ──── poll_targets() → one task per status poll → on_status / on_nack / on_timeout
//!   CommandDesk ─── take_command() for every inbound `<prefix>/command/<light>` poll
//! ```
//!
//! On shutdown no new polls are issued; polls already in flight run to their
//! own timeout before the cycle task is joined.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::arbiter::Coordinator;
use crate::config::{TimingConfig, TopologyConfig};
use crate::metrics::RttSink;
use crate::protocol::{command_prefix, light_from_command_name};
use crate::transport::{Payload, PollOutcome, RequestHandler, Transport};

pub struct Orchestrator {
    prefix: String,
    timing: TimingConfig,
    coordinator: Arc<Mutex<Coordinator>>,
    transport: Arc<dyn Transport>,
    sink: Arc<Mutex<RttSink>>,
}

impl Orchestrator {
    pub fn new(topology: &TopologyConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            prefix: topology.orchestrator.prefix.clone(),
            timing: topology.timing.clone(),
            coordinator: Arc::new(Mutex::new(Coordinator::from_topology(
                topology,
                Instant::now(),
            ))),
            transport,
            sink: Arc::new(Mutex::new(RttSink::disabled())),
        }
    }

    pub fn with_rtt_sink(mut self, sink: RttSink) -> Self {
        self.sink = Arc::new(Mutex::new(sink));
        self
    }

    /// Shared handle to the decision core, for inspection.
    pub fn coordinator(&self) -> Arc<Mutex<Coordinator>> {
        Arc::clone(&self.coordinator)
    }

    /// Registers the command handler, then runs until `shutdown` flips to
    /// `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let desk = CommandDesk {
            prefix: self.prefix.clone(),
            coordinator: Arc::clone(&self.coordinator),
        };
        let command_prefix = command_prefix(&self.prefix);
        self.transport
            .register(&command_prefix, Arc::new(desk))
            .await
            .with_context(|| format!("Cannot register {command_prefix}"))?;
        info!(prefix = %command_prefix, "Orchestrator serving commands");

        let cycle = tokio::spawn(run_cycles(
            Arc::clone(&self.coordinator),
            self.timing.poll_interval(),
            shutdown.clone(),
        ));

        let mut ticker = tokio::time::interval(self.timing.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let targets = self.coordinator.lock().await.poll_targets(Instant::now());
                    for name in targets {
                        polls.spawn(poll_status(
                            name,
                            Arc::clone(&self.transport),
                            Arc::clone(&self.coordinator),
                            Arc::clone(&self.sink),
                            self.timing.status_timeout(),
                        ));
                    }
                }
                Some(done) = polls.join_next(), if !polls.is_empty() => {
                    if let Err(e) = done {
                        warn!(error = %e, "Status poll task failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        debug!(in_flight = polls.len(), "Draining status polls");
        while polls.join_next().await.is_some() {}
        cycle.await.context("Cycle task panicked")?;
        info!("Orchestrator stopped");
        Ok(())
    }
}

async fn run_cycles(
    coordinator: Arc<Mutex<Coordinator>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => coordinator.lock().await.tick(Instant::now()),
            _ = shutdown.changed() => break,
        }
    }
}

async fn poll_status(
    name: String,
    transport: Arc<dyn Transport>,
    coordinator: Arc<Mutex<Coordinator>>,
    sink: Arc<Mutex<RttSink>>,
    timeout: Duration,
) {
    match transport.poll(&name, timeout).await {
        PollOutcome::Response(payload) => {
            let rtt = coordinator
                .lock()
                .await
                .on_status(&name, &payload.as_text(), Instant::now());
            if let Some(rtt_ms) = rtt {
                sink.lock().await.record(rtt_ms);
            }
        }
        PollOutcome::Nack(reason) => coordinator.lock().await.on_nack(&name, &reason),
        PollOutcome::Timeout => coordinator.lock().await.on_timeout(&name),
    }
}

/// Answers `<prefix>/command/<light>` polls from the pending buffers.
struct CommandDesk {
    prefix: String,
    coordinator: Arc<Mutex<Coordinator>>,
}

#[async_trait]
impl RequestHandler for CommandDesk {
    async fn on_request(&self, name: &str) -> Option<Payload> {
        let Some(light) = light_from_command_name(&self.prefix, name) else {
            warn!(name, "Dropping command poll with no light name");
            return None;
        };
        let Some(command) = self.coordinator.lock().await.take_command(light) else {
            warn!(light, "Dropping command poll for undeclared light");
            return None;
        };
        if !command.is_empty() {
            debug!(light, %command, "Delivering commands");
        }
        Some(Payload::text(command))
    }
}
