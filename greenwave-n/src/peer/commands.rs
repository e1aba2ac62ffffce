/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command interpreter.
//!
//! Tokens apply left to right.  `if_state:<S>` stops the rest of the batch
//! unless the light currently shows `S`.  A batch identical to the previous
//! one arriving within the de-duplication window is discarded whole.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use greenwave_o::light::{LightState, MIN_PHASE_MS};
use greenwave_o::protocol::command::{self, Command, TimeValue};

use super::PeerState;

/// Remaining time `decrease_time` never goes below.
const MIN_REMAINING_MS: u64 = 1_000;

/// What happened to one command-poll payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Empty,
    Duplicate,
    Applied { tokens: usize },
}

impl PeerState {
    /// Handles a successful command poll received at `now`.
    pub fn on_command_payload(&mut self, payload: &str, now: Instant) -> Delivery {
        self.consecutive_timeouts = 0;

        let content = payload.trim().trim_start_matches(';');
        if content.trim_matches(|c: char| c == ';' || c.is_whitespace()).is_empty() {
            return Delivery::Empty;
        }

        if let Some((last, at)) = &self.last_command {
            if last == content && now.saturating_duration_since(*at) < self.dedup_window {
                debug!(light = %self.name, "Discarding repeated command");
                return Delivery::Duplicate;
            }
        }
        self.last_command = Some((content.to_string(), now));

        let commands = command::parse(content);
        info!(light = %self.name, command = content, "Applying command");
        let mut applied = 0;
        for cmd in commands {
            if !self.apply(cmd) {
                break;
            }
            applied += 1;
        }
        Delivery::Applied { tokens: applied }
    }

    /// Applies one command.  `false` when an `if_state` gate closes the
    /// rest of the batch.
    pub fn apply(&mut self, cmd: Command) -> bool {
        let in_alert = self.display == LightState::Alert;
        match cmd {
            Command::IfState(state) => {
                if self.display != state {
                    debug!(light = %self.name, expected = %state, actual = %self.display, "Gate closed");
                    return false;
                }
            }
            Command::SetState(LightState::Alert) => self.enter_alert("commanded"),
            Command::SetState(LightState::Unknown) => {}
            Command::SetState(state) => {
                if state != self.display {
                    self.enter_phase(state);
                }
            }
            Command::SetTime(_)
            | Command::SetCurrentTime(_)
            | Command::IncreaseTime(_)
            | Command::DecreaseTime(_)
                if in_alert =>
            {
                debug!(light = %self.name, %cmd, "Ignoring time command in ALERT");
            }
            Command::SetTime(value) => {
                let ms = match value {
                    TimeValue::Millis(ms) => Some(ms),
                    TimeValue::Default => self.defaults.get(self.display),
                };
                if let Some(ms) = ms {
                    self.durations.set(self.display, ms);
                }
            }
            Command::SetCurrentTime(ms) => {
                self.time_left_ms = match self.display {
                    LightState::Green => ms.saturating_sub(self.durations.yellow_ms),
                    _ => ms,
                };
            }
            Command::IncreaseTime(ms) => self.time_left_ms = self.time_left_ms.saturating_add(ms),
            Command::DecreaseTime(ms) => {
                self.time_left_ms = self.time_left_ms.saturating_sub(ms).max(MIN_REMAINING_MS);
            }
            Command::SetGreenDuration(ms) => self.durations.green_ms = ms,
            Command::SetRedDuration(ms) => self.durations.red_ms = ms,
            Command::IncreaseGreenDuration(ms) => {
                self.durations.green_ms = self.durations.green_ms.saturating_add(ms)
            }
            Command::IncreaseRedDuration(ms) => {
                self.durations.red_ms = self.durations.red_ms.saturating_add(ms)
            }
            Command::DecreaseGreenDuration(ms) => {
                if let Some(v) = shrink(self.durations.green_ms, ms) {
                    self.durations.green_ms = v;
                } else {
                    warn!(light = %self.name, %cmd, "Refusing to shorten green below minimum");
                }
            }
            Command::DecreaseRedDuration(ms) => {
                if let Some(v) = shrink(self.durations.red_ms, ms) {
                    self.durations.red_ms = v;
                } else {
                    warn!(light = %self.name, %cmd, "Refusing to shorten red below minimum");
                }
            }
            Command::SetDefaultDuration => self.durations = self.defaults,
        }
        true
    }
}

fn shrink(current: u64, by: u64) -> Option<u64> {
    current.checked_sub(by).filter(|v| *v >= MIN_PHASE_MS)
}
