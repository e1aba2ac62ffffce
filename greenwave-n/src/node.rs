/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node runtime: phase task, command-poll loop and status handler around
//! one shared [`PeerState`].
//!
//! The command poll runs inline in its loop, so at most one is ever
//! outstanding.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use greenwave_o::config::TimingConfig;
use greenwave_o::metrics::RttSink;
use greenwave_o::protocol::command_name;
use greenwave_o::rtt::RttEstimator;
use greenwave_o::transport::{Payload, PollOutcome, RequestHandler, Transport};

use crate::peer::{Delivery, PeerState};

pub struct Node {
    name: String,
    command_name: String,
    timing: TimingConfig,
    state: Arc<Mutex<PeerState>>,
    transport: Arc<dyn Transport>,
    rtt: RttEstimator,
    sink: RttSink,
}

impl Node {
    pub fn new(
        peer: PeerState,
        orchestrator_prefix: &str,
        timing: &TimingConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name: peer.name().to_string(),
            command_name: command_name(orchestrator_prefix, peer.name()),
            timing: timing.clone(),
            state: Arc::new(Mutex::new(peer)),
            transport,
            rtt: RttEstimator::new(),
            sink: RttSink::disabled(),
        }
    }

    pub fn with_rtt_sink(mut self, sink: RttSink) -> Self {
        self.sink = sink;
        self
    }

    /// Shared handle to the light state, for inspection.
    pub fn state(&self) -> Arc<Mutex<PeerState>> {
        Arc::clone(&self.state)
    }

    /// Registers the status handler, then runs until `shutdown` flips to
    /// `true` (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let desk = StatusDesk {
            state: Arc::clone(&self.state),
        };
        self.transport
            .register(&self.name, Arc::new(desk))
            .await
            .with_context(|| format!("Cannot register {}", self.name))?;
        info!(light = %self.name, commands = %self.command_name, "Node running");

        let phases = tokio::spawn(run_phases(
            Arc::clone(&self.state),
            self.timing.poll_interval(),
            shutdown.clone(),
        ));

        let mut ticker = tokio::time::interval(self.timing.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_commands().await,
                _ = shutdown.changed() => {
                    info!(light = %self.name, "Shutdown signal received");
                    break;
                }
            }
        }

        phases.await.context("Phase task panicked")?;
        info!(light = %self.name, "Node stopped");
        Ok(())
    }

    async fn poll_commands(&mut self) {
        let sent = Instant::now();
        let outcome = self
            .transport
            .poll(&self.command_name, self.timing.command_timeout())
            .await;

        match outcome {
            PollOutcome::Response(payload) => {
                let rtt_ms = self.rtt.record(sent.elapsed());
                self.sink.record(rtt_ms);
                let delivery = self
                    .state
                    .lock()
                    .await
                    .on_command_payload(&payload.as_text(), Instant::now());
                if let Delivery::Applied { tokens } = delivery {
                    debug!(
                        light = %self.name,
                        tokens,
                        rtt_ms,
                        one_way_ms = self.rtt.one_way_ms(),
                        "Command batch applied"
                    );
                }
            }
            PollOutcome::Nack(reason) => self.state.lock().await.on_poll_nack(&reason),
            PollOutcome::Timeout => self.state.lock().await.on_poll_timeout(),
        }
    }
}

async fn run_phases(
    state: Arc<Mutex<PeerState>>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the initial phase gets its full length.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => state.lock().await.tick(),
            _ = shutdown.changed() => break,
        }
    }
}

/// Answers orchestrator status polls.
struct StatusDesk {
    state: Arc<Mutex<PeerState>>,
}

#[async_trait]
impl RequestHandler for StatusDesk {
    async fn on_request(&self, _name: &str) -> Option<Payload> {
        let status = self.state.lock().await.status();
        Some(Payload::text(status.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::peer::testing::peer;
    use greenwave_o::light::LightState;
    use greenwave_o::transport::{Fault, MemoryTransport};

    /// Orchestrator stand-in that hands out one fixed command batch.
    struct FixedCommand(&'static str);

    #[async_trait]
    impl RequestHandler for FixedCommand {
        async fn on_request(&self, _name: &str) -> Option<Payload> {
            Some(Payload::text(self.0))
        }
    }

    fn start(
        net: &MemoryTransport,
        state: &str,
    ) -> (
        Arc<Mutex<PeerState>>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let node = Node::new(
            peer(state),
            "/central",
            &TimingConfig::default(),
            Arc::new(net.clone()),
        );
        let shared = node.state();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(node.run(rx));
        (shared, tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn answers_status_polls() {
        let net = MemoryTransport::new();
        net.register("/central/command", Arc::new(FixedCommand("")))
            .await
            .unwrap();
        let (_state, tx, handle) = start(&net, "GREEN");
        tokio::time::sleep(Duration::from_millis(10)).await;

        match net.poll("/tl/1", Duration::from_secs(1)).await {
            PollOutcome::Response(p) => assert!(p.as_text().starts_with("GREEN|15000|")),
            other => panic!("unexpected {other:?}"),
        }

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn applies_polled_commands() {
        let net = MemoryTransport::new();
        net.register(
            "/central/command",
            Arc::new(FixedCommand(";set_state:RED;set_current_time:9900")),
        )
        .await
        .unwrap();
        let (state, tx, handle) = start(&net, "GREEN");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(state.lock().await.display(), LightState::Red);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_orchestrator_puts_light_in_alert() {
        let net = MemoryTransport::new();
        net.register("/central/command", Arc::new(FixedCommand("")))
            .await
            .unwrap();
        net.inject("/central/command", Fault::Drop).await;
        let (state, tx, handle) = start(&net, "GREEN");

        // Three polls, each waiting out its 2 s timeout.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(state.lock().await.display(), LightState::Alert);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
