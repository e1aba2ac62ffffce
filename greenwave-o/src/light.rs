/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core traffic-light data structures shared by the orchestrator and the
//! nodes.
//!
//! ```text
//! YAML  ──(LightConfig)──►  TrafficLight  ──(arbiter)──►  Command batch  ──(poll)──►  Greenwave-N
//!                             ↑ orchestrator belief          ↑ typed, serialised only at the wire
//! ```
//!
//! # Remaining-time convention
//! For a permissive phase (GREEN or YELLOW) "remaining time" always means the
//! time until the light next shows RED.  A GREEN node therefore reports
//! `green_left + yellow`, and the orchestrator never adds a yellow clearance
//! of its own: the node that owns the yellow phase counts it exactly once.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::command::Command;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Fixed yellow clearance, in milliseconds.
pub const YELLOW_TIME_MS: u64 = 3_000;

/// Shortest configured phase a duration decrease may leave behind.
pub const MIN_PHASE_MS: u64 = 5_000;

/// Longest remaining time the orchestrator will believe (one day).
pub const MAX_REMAINING_MS: u64 = 86_400_000;

// ── Display state ─────────────────────────────────────────────────────────────

/// What a signal is showing, or what the orchestrator believes it shows.
///
/// `Unknown` is orchestrator-only: a node never reports it about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightState {
    Green,
    Yellow,
    Red,
    /// Fault/flashing mode.  Absorbing until an explicit `set_state`.
    Alert,
    /// The orchestrator lost contact with the node.
    Unknown,
}

impl LightState {
    /// Wire spelling used in status and command payloads.
    pub fn as_wire(self) -> &'static str {
        match self {
            LightState::Green => "GREEN",
            LightState::Yellow => "YELLOW",
            LightState::Red => "RED",
            LightState::Alert => "ALERT",
            LightState::Unknown => "UNKNOWN",
        }
    }

    /// GREEN or YELLOW: the light currently grants right-of-way.
    pub fn is_permissive(self) -> bool {
        matches!(self, LightState::Green | LightState::Yellow)
    }

    /// Next state of the GREEN → YELLOW → RED cycle.  `Alert` and `Unknown`
    /// have no successor and map to themselves.
    pub fn next_phase(self) -> Self {
        match self {
            LightState::Green => LightState::Yellow,
            LightState::Yellow => LightState::Red,
            LightState::Red => LightState::Green,
            other => other,
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Error returned when a state string is not one of the five wire names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStateName(pub String);

impl fmt::Display for UnknownStateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown light state '{}'", self.0)
    }
}

impl std::error::Error for UnknownStateName {}

impl FromStr for LightState {
    type Err = UnknownStateName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "GREEN" => Ok(LightState::Green),
            "YELLOW" => Ok(LightState::Yellow),
            "RED" => Ok(LightState::Red),
            "ALERT" => Ok(LightState::Alert),
            "UNKNOWN" => Ok(LightState::Unknown),
            other => Err(UnknownStateName(other.to_string())),
        }
    }
}

// ── Phase durations ───────────────────────────────────────────────────────────

/// Configured length of each phase of the colour cycle, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub green_ms: u64,
    pub yellow_ms: u64,
    pub red_ms: u64,
}

impl PhaseDurations {
    /// Split a full cycle (seconds) into phases: red takes half the cycle,
    /// green the other half minus the yellow clearance.
    ///
    /// Returns `None` when the cycle is too short to leave a positive green.
    pub fn from_cycle_secs(cycle_secs: u32) -> Option<Self> {
        let half_ms = u64::from(cycle_secs / 2) * 1_000;
        if half_ms <= YELLOW_TIME_MS {
            return None;
        }
        Some(Self {
            green_ms: half_ms - YELLOW_TIME_MS,
            yellow_ms: YELLOW_TIME_MS,
            red_ms: half_ms,
        })
    }

    /// Configured duration of `state`.  Non-cyclic states have none.
    pub fn get(&self, state: LightState) -> Option<u64> {
        match state {
            LightState::Green => Some(self.green_ms),
            LightState::Yellow => Some(self.yellow_ms),
            LightState::Red => Some(self.red_ms),
            LightState::Alert | LightState::Unknown => None,
        }
    }

    /// Overwrite the configured duration of `state`.  Ignored for
    /// non-cyclic states.
    pub fn set(&mut self, state: LightState, ms: u64) {
        match state {
            LightState::Green => self.green_ms = ms,
            LightState::Yellow => self.yellow_ms = ms,
            LightState::Red => self.red_ms = ms,
            LightState::Alert | LightState::Unknown => {}
        }
    }

    /// Time from the start of `state` until the light next shows RED.
    pub fn until_red(&self, state: LightState) -> u64 {
        match state {
            LightState::Green => self.green_ms + self.yellow_ms,
            LightState::Yellow => self.yellow_ms,
            LightState::Red => self.red_ms,
            LightState::Alert | LightState::Unknown => 0,
        }
    }
}

// ── Membership ────────────────────────────────────────────────────────────────

/// Which coordination structures a light takes part in.  Derived once at
/// topology load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Membership {
    pub intersection: bool,
    pub green_wave: bool,
    pub sync_group: bool,
}

// ── Priority hysteresis state ─────────────────────────────────────────────────

/// Direction of the last priority-driven duration shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdjustDirection {
    #[default]
    Neutral,
    /// Green lengthened / red shortened.
    Gaining,
    /// Green shortened / red lengthened.
    Ceding,
}

/// Hysteresis bookkeeping: how many consecutive steps were applied in
/// `direction`.  `debt` stays within `0..=MAX_ADJUST_STEPS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentState {
    pub debt: u8,
    pub direction: AdjustDirection,
}

// ── TrafficLight (orchestrator view) ──────────────────────────────────────────

/// The orchestrator's belief about one physical signal.
///
/// Created from configuration at start-up, mutated only by the arbitration
/// cycle or by transport events, never removed during a run.
#[derive(Debug, Clone)]
pub struct TrafficLight {
    /// Unique name; also the name the node answers status polls on.
    pub name: String,

    pub state: LightState,

    /// Current configured phase lengths as far as the orchestrator knows.
    pub durations: PhaseDurations,

    /// Configuration snapshot used by `set_default_duration`.
    pub default_durations: PhaseDurations,

    /// Absolute time the current phase ends (time-corrected).
    pub phase_end: Instant,

    /// Last observed priority score.
    pub priority: f64,

    /// Outbound commands not yet fetched by the node.
    pub pending: Vec<Command>,

    pub consecutive_timeouts: u32,

    pub membership: Membership,

    pub adjustment: AdjustmentState,

    /// When the last hysteresis step was queued.
    pub last_nudge: Option<Instant>,
}

impl TrafficLight {
    pub fn new(
        name: impl Into<String>,
        state: LightState,
        durations: PhaseDurations,
        now: Instant,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            durations,
            default_durations: durations,
            phase_end: now + Duration::from_millis(durations.until_red(state)),
            priority: 0.0,
            pending: Vec::new(),
            consecutive_timeouts: 0,
            membership: Membership::default(),
            adjustment: AdjustmentState::default(),
            last_nudge: None,
        }
    }

    /// Milliseconds until `phase_end`, zero if already past.
    pub fn remaining_ms(&self, now: Instant) -> u64 {
        self.phase_end.saturating_duration_since(now).as_millis() as u64
    }

    /// Re-anchor `phase_end` at `now + ms`, capped at [`MAX_REMAINING_MS`].
    pub fn set_remaining(&mut self, now: Instant, ms: u64) {
        self.phase_end = now + Duration::from_millis(ms.min(MAX_REMAINING_MS));
    }

    pub fn is_unknown(&self) -> bool {
        self.state == LightState::Unknown
    }

    pub fn is_active(&self) -> bool {
        self.state.is_permissive()
    }

    /// Append commands to the outbound buffer.
    pub fn queue<I: IntoIterator<Item = Command>>(&mut self, commands: I) {
        self.pending.extend(commands);
    }

    /// Drain the outbound buffer into its wire form.  Empty string when
    /// nothing is pending.
    pub fn take_command(&mut self) -> String {
        let wire = crate::protocol::command::encode(&self.pending);
        self.pending.clear();
        wire
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
