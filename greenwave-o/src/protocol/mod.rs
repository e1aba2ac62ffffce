/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Status/command exchange: naming and payload codecs.
//!
//! | direction | name | payload |
//! |---|---|---|
//! | orchestrator → node | `<light>` | `"<STATE>\|<remainingMs>\|<priority>"` |
//! | node → orchestrator | `<prefix>/command<light>` | `;`-joined `type:value` tokens |
//!
//! Both exchanges are pulls: the side that wants data polls, the other side
//! answers from its registered handler.

pub mod command;

use std::fmt;

use thiserror::Error;

use crate::light::LightState;

/// Path segment appended to the orchestrator prefix for command polls.
pub const COMMAND_SEGMENT: &str = "/command";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("status payload '{payload}' does not have three '|' separated fields")]
    StatusFieldCount { payload: String },

    #[error("status payload has invalid state '{state}'")]
    StatusState { state: String },

    #[error("status payload has invalid {field} '{value}'")]
    StatusNumber { field: &'static str, value: String },

    #[error("command token '{token}' is malformed")]
    MalformedToken { token: String },

    #[error("unknown command type '{kind}'")]
    UnknownCommand { kind: String },
}

// ── Naming ────────────────────────────────────────────────────────────────────

/// Ensures a name starts with a single `/`.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Name a node polls to fetch its pending commands.
pub fn command_name(prefix: &str, light: &str) -> String {
    format!("{prefix}{COMMAND_SEGMENT}{}", normalize_name(light))
}

/// Prefix the orchestrator registers its command handler under.
pub fn command_prefix(prefix: &str) -> String {
    format!("{prefix}{COMMAND_SEGMENT}")
}

/// Inverse of [`command_name`]: the light a command poll is for.
pub fn light_from_command_name<'a>(prefix: &str, name: &'a str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?.strip_prefix(COMMAND_SEGMENT)?;
    (rest.len() > 1 && rest.starts_with('/')).then_some(rest)
}

// ── Status report ─────────────────────────────────────────────────────────────

/// One status answer from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub state: LightState,
    /// Time until the light next shows RED (or phase remaining when RED).
    pub remaining_ms: u64,
    pub priority: f64,
}

impl StatusReport {
    /// Parses `"<STATE>|<remainingMs>|<priority>"`.  Negative remaining
    /// times clamp to zero.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = payload.trim().split('|').collect();
        let [state, remaining, priority] = fields[..] else {
            return Err(ProtocolError::StatusFieldCount {
                payload: payload.to_string(),
            });
        };

        let state = state
            .parse::<LightState>()
            .map_err(|e| ProtocolError::StatusState { state: e.0 })?;
        // UNKNOWN is an orchestrator-side belief, never a node's phase.
        if state == LightState::Unknown {
            return Err(ProtocolError::StatusState {
                state: state.to_string(),
            });
        }

        let remaining_ms = remaining
            .trim()
            .parse::<i64>()
            .map_err(|_| ProtocolError::StatusNumber {
                field: "remaining time",
                value: remaining.to_string(),
            })?
            .max(0) as u64;

        let priority = priority
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
            .ok_or_else(|| ProtocolError::StatusNumber {
                field: "priority",
                value: priority.to_string(),
            })?;

        Ok(Self {
            state,
            remaining_ms,
            priority,
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{:.2}", self.state, self.remaining_ms, self.priority)
    }
}
