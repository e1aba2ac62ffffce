/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Validation failures for a topology file.
//!
//! Every variant is fatal: the process refuses to start rather than run a
//! partially coordinated grid.  Variants carry the offending names so the
//! message printed by `main` points straight at the YAML entry to fix.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("topology declares no traffic lights")]
    NoLights,

    /// Cadences, timeouts and thresholds must all be positive.
    #[error("timing.{field} must be greater than zero")]
    ZeroTiming { field: &'static str },

    #[error("traffic light '{light}' is declared more than once")]
    DuplicateLight { light: String },

    #[error("traffic light '{light}' has unknown initial state '{state}'")]
    UnknownState { light: String, state: String },

    /// The cycle leaves no positive green after the yellow clearance.
    #[error("traffic light '{light}': cycle_time {cycle_time}s is too short for a green phase")]
    CycleTooShort { light: String, cycle_time: u32 },

    #[error("intersection '{intersection}' must have exactly 2 traffic lights, found {count}")]
    IntersectionArity { intersection: String, count: usize },

    #[error("traffic light '{light}' belongs to both '{first}' and '{second}'")]
    SharedIntersectionMember {
        light: String,
        first: String,
        second: String,
    },

    /// Green waves and sync groups need a leader plus at least one follower.
    #[error("{kind} '{group}' needs at least 2 traffic lights, found {count}")]
    GroupTooSmall {
        kind: &'static str,
        group: String,
        count: usize,
    },

    #[error("{kind} '{group}' references undeclared traffic light '{light}'")]
    UnknownMember {
        kind: &'static str,
        group: String,
        light: String,
    },
}
