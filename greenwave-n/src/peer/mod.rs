/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node-side light state machine.
//!
//! ```text
//!   GREEN ──► YELLOW ──► RED ──► GREEN ...
//!     └──────────┴─────────┴──► ALERT   (set_state:ALERT, poll nack, repeated poll timeouts)
//!   ALERT ──► any phase                  (explicit set_state only)
//! ```
//!
//! In ALERT the phase clock stops but the load generator keeps running, so
//! the priority reported after recovery reflects the queue built up
//! meanwhile.

mod commands;
mod traffic;

pub use commands::Delivery;
pub use traffic::TrafficSim;

use std::time::Duration;

use rand::rngs::StdRng;
use tokio::time::Instant;
use tracing::{debug, warn};

use greenwave_o::config::{LightConfig, TimingConfig};
use greenwave_o::light::{LightState, PhaseDurations};
use greenwave_o::protocol::StatusReport;

/// GREEN ticks before vehicles start leaving the queue.
const SETTLE_TICKS: u32 = 2;

#[derive(Debug)]
pub struct PeerState {
    name: String,
    display: LightState,
    /// Time left in the current phase (GREEN: green only).
    time_left_ms: u64,
    durations: PhaseDurations,
    defaults: PhaseDurations,
    traffic: TrafficSim,
    green_bonus: f64,
    tick_ms: u64,
    settle_ticks: u32,
    consecutive_timeouts: u32,
    alert_after_timeouts: u32,
    /// Last applied command payload and when it arrived.
    last_command: Option<(String, Instant)>,
    dedup_window: Duration,
}

impl PeerState {
    pub fn new(config: &LightConfig, timing: &TimingConfig, rng: StdRng) -> Self {
        let display = config.initial_state;
        Self {
            name: config.name.clone(),
            display,
            time_left_ms: config.durations.get(display).unwrap_or(0),
            durations: config.durations,
            defaults: config.durations,
            traffic: TrafficSim::new(config.columns, config.capacity(), config.intensity, rng),
            green_bonus: config.green_bonus,
            tick_ms: timing.poll_interval_ms,
            settle_ticks: 0,
            consecutive_timeouts: 0,
            alert_after_timeouts: timing.peer_alert_after_timeouts,
            last_command: None,
            dedup_window: timing.dedup_window(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display(&self) -> LightState {
        self.display
    }

    pub fn time_left_ms(&self) -> u64 {
        self.time_left_ms
    }

    pub fn durations(&self) -> PhaseDurations {
        self.durations
    }

    pub fn traffic(&self) -> &TrafficSim {
        &self.traffic
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    // ── Phase clock ───────────────────────────────────────────────────────────

    /// Advances the simulation by one tick.
    pub fn tick(&mut self) {
        self.traffic.arrive();

        if self.display == LightState::Alert {
            return;
        }
        if self.display == LightState::Green {
            self.serve_green();
        }

        self.time_left_ms = self.time_left_ms.saturating_sub(self.tick_ms);
        if self.time_left_ms == 0 {
            self.enter_phase(self.display.next_phase());
        }
    }

    fn serve_green(&mut self) {
        if self.settle_ticks == 0 {
            self.traffic.reset_cycle();
        }
        if self.settle_ticks >= SETTLE_TICKS {
            let left = self.traffic.drain();
            debug!(light = %self.name, left, queued = self.traffic.queued(), "Vehicles left");
        } else {
            self.settle_ticks += 1;
        }
    }

    /// Starts `state` with its configured duration.
    fn enter_phase(&mut self, state: LightState) {
        debug!(light = %self.name, from = %self.display, to = %state, "Phase change");
        self.display = state;
        self.time_left_ms = self.durations.get(state).unwrap_or(0);
        self.settle_ticks = 0;
    }

    pub(crate) fn enter_alert(&mut self, cause: &str) {
        if self.display != LightState::Alert {
            warn!(light = %self.name, from = %self.display, cause, "Entering ALERT");
        }
        self.display = LightState::Alert;
        self.time_left_ms = 0;
        self.settle_ticks = 0;
    }

    // ── Status ────────────────────────────────────────────────────────────────

    pub fn priority(&self) -> f64 {
        let bonus = if self.display == LightState::Green {
            self.green_bonus
        } else {
            0.0
        };
        self.traffic.score() + bonus
    }

    /// Answer to an orchestrator status poll.  Permissive phases report
    /// time until RED, so GREEN includes the yellow clearance.
    pub fn status(&self) -> StatusReport {
        let remaining_ms = match self.display {
            LightState::Green => self.time_left_ms.saturating_add(self.durations.yellow_ms),
            LightState::Yellow | LightState::Red => self.time_left_ms,
            LightState::Alert | LightState::Unknown => 0,
        };
        StatusReport {
            state: self.display,
            remaining_ms,
            priority: self.priority(),
        }
    }

    // ── Command-poll outcomes ─────────────────────────────────────────────────

    pub fn on_poll_timeout(&mut self) {
        self.consecutive_timeouts += 1;
        debug!(
            light = %self.name,
            consecutive = self.consecutive_timeouts,
            "Command poll timed out"
        );
        if self.consecutive_timeouts >= self.alert_after_timeouts {
            self.enter_alert("orchestrator unreachable");
        }
    }

    pub fn on_poll_nack(&mut self, reason: &str) {
        warn!(light = %self.name, reason, "Command poll refused");
        self.enter_alert("command poll refused");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use rand::SeedableRng;

    use super::*;
    use greenwave_o::config::TopologyConfig;

    pub fn peer(state: &str) -> PeerState {
        let yaml = format!(
            "traffic-lights:\n  - {{ name: /tl/1, state: {state}, cycle_time: 30, columns: 2, lines: 5, intensity: HIGH }}\n"
        );
        let topo = TopologyConfig::from_yaml_str(&yaml).unwrap();
        PeerState::new(&topo.lights[0], &topo.timing, StdRng::seed_from_u64(1))
    }
}
