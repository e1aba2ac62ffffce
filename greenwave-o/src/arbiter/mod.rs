/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Arbitration engine – the orchestrator's decision core.
//!
//! [`Coordinator`] owns every [`TrafficLight`] belief plus the coordination
//! structures built from the topology.  It performs no I/O: the runtime feeds
//! it transport events and clock readings and drains the command buffers it
//! fills.  All methods take `now` explicitly so tests drive time by hand.
//!
//! # One tick, in order
//! | phase | module | output |
//! |---|---|---|
//! | 1. sync groups | [`sync`] | followers mirror the leader |
//! | 2. priority + hysteresis | [`hysteresis`] | phase-length nudges, ALERT baseline |
//! | 3. intersections | [`intersection`] | RED holds, watchdog, recovery |
//! | 4. green waves | [`wave`] | offsets along the corridor |
//!
//! Transport events are handled by [`fault`].

mod fault;
mod hysteresis;
mod intersection;
mod sync;
mod wave;

pub use hysteresis::{Nudge, Trend, ADJUST_STEP_MS, ALERT_BASELINE_RED_MS, MAX_ADJUST_STEPS};
pub use intersection::{GREEN_BASE_TIME_MS, INTERSECTION_TOLERANCE_MS, RECOVERY_RED_TIME_MS};
pub use sync::SYNC_TOLERANCE_MS;
pub use wave::{WAVE_COMPETITOR_BIAS, WAVE_ESCALATE_MS};

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{TimingConfig, TopologyConfig};
use crate::light::TrafficLight;
use crate::rtt::RttEstimator;

// ── Coordination structures ───────────────────────────────────────────────────

/// Two competing lights sharing conflict space.
#[derive(Debug, Clone)]
pub struct Intersection {
    pub name: String,
    pub members: [String; 2],
    pub compromised: bool,
    pub needs_normalization: bool,
    /// Consecutive ticks with neither member GREEN/YELLOW.
    pub idle_ticks: u32,
    /// Members by descending priority; ties keep configuration order.
    pub priority_order: Vec<String>,
}

impl Intersection {
    pub fn contains(&self, light: &str) -> bool {
        self.members.iter().any(|m| m == light)
    }

    /// The member that is not `light`.
    pub fn other(&self, light: &str) -> Option<&str> {
        match &self.members {
            [a, b] if a == light => Some(b.as_str()),
            [a, b] if b == light => Some(a.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GreenWave {
    pub name: String,
    pub members: Vec<String>,
    pub travel_time_ms: u64,
    /// Set on the leader's GREEN edge, cleared when it leaves GREEN.
    pub triggered: bool,
}

#[derive(Debug, Clone)]
pub struct SyncGroup {
    pub name: String,
    pub members: Vec<String>,
}

/// Thresholds the engine reads from [`TimingConfig`].
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    watchdog_cycles: u32,
    timeouts_to_unknown: u32,
    unknown_probe_every: u64,
    /// Minimum gap between two hysteresis steps for one light.  A node
    /// discards a repeated batch inside its de-dup window, and may fetch a
    /// batch up to one poll interval after it was queued.
    nudge_spacing: Duration,
}

impl From<&TimingConfig> for Thresholds {
    fn from(t: &TimingConfig) -> Self {
        Self {
            watchdog_cycles: t.watchdog_cycles,
            timeouts_to_unknown: t.timeouts_to_unknown,
            unknown_probe_every: t.unknown_probe_every,
            nudge_spacing: t.dedup_window() + t.poll_interval(),
        }
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Coordinator {
    lights: BTreeMap<String, TrafficLight>,
    intersections: Vec<Intersection>,
    waves: Vec<GreenWave>,
    sync_groups: Vec<SyncGroup>,
    rtt: RttEstimator,
    /// Status polls awaiting an outcome, by light name.
    in_flight: HashMap<String, Instant>,
    poll_cycle: u64,
    thresholds: Thresholds,
}

impl Coordinator {
    /// Builds beliefs from configuration.  Every light starts in its
    /// configured state with a full phase ahead of it.
    pub fn from_topology(topology: &TopologyConfig, now: Instant) -> Self {
        let mut lights: BTreeMap<String, TrafficLight> = topology
            .lights
            .iter()
            .map(|cfg| {
                let light = TrafficLight::new(&cfg.name, cfg.initial_state, cfg.durations, now);
                (cfg.name.clone(), light)
            })
            .collect();

        for cfg in &topology.intersections {
            for member in &cfg.members {
                if let Some(light) = lights.get_mut(member) {
                    light.membership.intersection = true;
                }
            }
        }
        for cfg in &topology.green_waves {
            for member in &cfg.members {
                if let Some(light) = lights.get_mut(member) {
                    light.membership.green_wave = true;
                }
            }
        }
        for cfg in &topology.sync_groups {
            for member in &cfg.members {
                if let Some(light) = lights.get_mut(member) {
                    light.membership.sync_group = true;
                }
            }
        }

        let intersections = topology
            .intersections
            .iter()
            .map(|cfg| Intersection {
                name: cfg.name.clone(),
                members: cfg.members.clone(),
                compromised: false,
                needs_normalization: false,
                idle_ticks: 0,
                priority_order: cfg.members.to_vec(),
            })
            .collect();

        let waves = topology
            .green_waves
            .iter()
            .map(|cfg| GreenWave {
                name: cfg.name.clone(),
                members: cfg.members.clone(),
                travel_time_ms: cfg.travel_time_ms,
                triggered: false,
            })
            .collect();

        let sync_groups = topology
            .sync_groups
            .iter()
            .map(|cfg| SyncGroup {
                name: cfg.name.clone(),
                members: cfg.members.clone(),
            })
            .collect();

        info!(lights = lights.len(), "Coordinator initialised");

        Self {
            lights,
            intersections,
            waves,
            sync_groups,
            rtt: RttEstimator::new(),
            in_flight: HashMap::new(),
            poll_cycle: 0,
            thresholds: Thresholds::from(&topology.timing),
        }
    }

    /// Runs one arbitration cycle.
    pub fn tick(&mut self, now: Instant) {
        self.sync_followers(now);
        self.assign_priorities(now);
        self.arbitrate_intersections(now);
        self.propagate_green_waves(now);
    }

    // ── Polling bookkeeping ───────────────────────────────────────────────────

    /// Lights to status-poll this cycle; each is marked in flight.
    ///
    /// Lights with an outstanding poll are skipped.  UNKNOWN lights are only
    /// probed every `unknown_probe_every` cycles.
    pub fn poll_targets(&mut self, now: Instant) -> Vec<String> {
        self.poll_cycle += 1;
        let probe_unknown = self.poll_cycle % self.thresholds.unknown_probe_every == 0;

        let names: Vec<String> = self
            .lights
            .values()
            .filter(|l| probe_unknown || !l.is_unknown())
            .map(|l| l.name.clone())
            .collect();

        names
            .into_iter()
            .filter(|name| self.begin_poll(name, now))
            .collect()
    }

    /// Marks a status poll to `name` as sent at `now`.  `false` if one is
    /// already outstanding or the light is not known.
    pub fn begin_poll(&mut self, name: &str, now: Instant) -> bool {
        if !self.lights.contains_key(name) || self.in_flight.contains_key(name) {
            return false;
        }
        self.in_flight.insert(name.to_string(), now);
        true
    }

    /// Drains the pending command batch for a node's command poll.
    ///
    /// `None` when the light is not part of the topology.
    pub fn take_command(&mut self, light: &str) -> Option<String> {
        let Some(light) = self.lights.get_mut(light) else {
            debug!(light, "Command poll for unknown light");
            return None;
        };
        Some(light.take_command())
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn light(&self, name: &str) -> Option<&TrafficLight> {
        self.lights.get(name)
    }

    pub fn light_mut(&mut self, name: &str) -> Option<&mut TrafficLight> {
        self.lights.get_mut(name)
    }

    pub fn lights(&self) -> impl Iterator<Item = &TrafficLight> {
        self.lights.values()
    }

    pub fn intersection(&self, name: &str) -> Option<&Intersection> {
        self.intersections.iter().find(|i| i.name == name)
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Index of the intersection `light` belongs to, if any.
    fn intersection_of(&self, light: &str) -> Option<usize> {
        self.intersections.iter().position(|i| i.contains(light))
    }
}

// ── Shared test fixtures ──────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::light::LightState;

    const GRID: &str = r#"
timing:
  unknown_probe_every: 5
traffic-lights:
  - { name: /a, state: GREEN, cycle_time: 30 }
  - { name: /b, state: RED, cycle_time: 30 }
  - { name: /c, state: RED, cycle_time: 30 }
  - { name: /d, state: RED, cycle_time: 30 }
intersections:
  - name: x
    traffic-lights: [/a, /b]
green_waves:
  - name: w
    traffic_lights: [/c, /d]
    travel_time_ms: 3000
sync_groups:
  - name: s
    traffic_lights: [/c, /d]
"#;

    #[test]
    fn membership_is_derived_from_topology() {
        let c = coordinator(GRID, Instant::now());
        let a = c.light("/a").unwrap();
        assert!(a.membership.intersection);
        assert!(!a.membership.green_wave);
        let d = c.light("/d").unwrap();
        assert!(d.membership.green_wave && d.membership.sync_group);
        assert!(!d.membership.intersection);
    }

    #[test]
    fn poll_targets_skip_in_flight_lights() {
        let now = Instant::now();
        let mut c = coordinator(GRID, now);
        assert_eq!(c.poll_targets(now).len(), 4);
        assert!(c.poll_targets(now).is_empty());
    }

    #[test]
    fn unknown_lights_probed_every_fifth_cycle() {
        let now = Instant::now();
        let mut c = coordinator(GRID, now);
        c.light_mut("/b").unwrap().state = LightState::Unknown;

        let mut probed_on = Vec::new();
        for cycle in 1..=10 {
            let targets = c.poll_targets(now);
            if targets.iter().any(|t| t == "/b") {
                probed_on.push(cycle);
            }
            for t in targets {
                c.on_timeout(&t);
                c.light_mut(&t).unwrap().consecutive_timeouts = 0;
            }
            c.light_mut("/b").unwrap().state = LightState::Unknown;
        }
        assert_eq!(probed_on, vec![5, 10]);
    }

    #[test]
    fn take_command_for_unknown_light_is_none() {
        let mut c = coordinator(GRID, Instant::now());
        assert!(c.take_command("/zz").is_none());
        assert_eq!(c.take_command("/a").as_deref(), Some(""));
    }
}
