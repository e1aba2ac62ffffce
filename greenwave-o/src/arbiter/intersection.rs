/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Intersection arbitration.
//!
//! Per intersection, per tick, exactly one of:
//!
//! | condition | action |
//! |---|---|
//! | `needs_normalization` | both members RED for [`RECOVERY_RED_TIME_MS`], flag cleared |
//! | `compromised` | every reachable member held in ALERT |
//! | a member is GREEN/YELLOW | the other is held RED until it turns RED |
//! | all RED for `watchdog_cycles` ticks | priority head forced GREEN |

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Coordinator;
use crate::light::LightState;
use crate::protocol::command::Command;

/// Green time granted by the all-RED watchdog.
pub const GREEN_BASE_TIME_MS: u64 = 10_000;

/// RED hold applied to both members after a compromised intersection heals.
pub const RECOVERY_RED_TIME_MS: u64 = 15_000;

/// Drift from the active member's end time tolerated before re-commanding.
pub const INTERSECTION_TOLERANCE_MS: u64 = 2_000;

impl Coordinator {
    pub(super) fn arbitrate_intersections(&mut self, now: Instant) {
        for idx in 0..self.intersections.len() {
            self.refresh_priority_order(idx);

            let inter = &self.intersections[idx];
            if inter.needs_normalization {
                self.normalize(idx, now);
            } else if inter.compromised {
                self.hold_in_alert(idx);
            } else {
                self.arbitrate(idx, now);
            }
        }
    }

    fn refresh_priority_order(&mut self, idx: usize) {
        let inter = &mut self.intersections[idx];
        let mut order: Vec<(String, f64)> = inter
            .members
            .iter()
            .map(|m| {
                let p = self.lights.get(m).map_or(0.0, |l| l.priority);
                (m.clone(), p)
            })
            .collect();
        // Stable sort keeps configuration order on ties.
        order.sort_by(|a, b| b.1.total_cmp(&a.1));
        inter.priority_order = order.into_iter().map(|(m, _)| m).collect();
    }

    fn normalize(&mut self, idx: usize, now: Instant) {
        let inter = &mut self.intersections[idx];
        info!(
            intersection = %inter.name,
            red_ms = RECOVERY_RED_TIME_MS,
            "Normalizing recovered intersection"
        );
        for name in &inter.members {
            if let Some(light) = self.lights.get_mut(name) {
                light.pending.clear();
                light.queue([
                    Command::SetState(LightState::Red),
                    Command::SetCurrentTime(RECOVERY_RED_TIME_MS),
                ]);
                light.state = LightState::Red;
                light.set_remaining(now, RECOVERY_RED_TIME_MS);
            }
        }
        inter.needs_normalization = false;
        inter.idle_ticks = 0;
    }

    fn hold_in_alert(&mut self, idx: usize) {
        let inter = &self.intersections[idx];
        for name in &inter.members {
            let Some(light) = self.lights.get_mut(name) else {
                continue;
            };
            if light.is_unknown() || light.state == LightState::Alert {
                continue;
            }
            warn!(
                intersection = %inter.name,
                light = %name,
                "Intersection compromised, switching member to ALERT"
            );
            light.queue([Command::SetState(LightState::Alert)]);
            light.state = LightState::Alert;
        }
    }

    fn arbitrate(&mut self, idx: usize, now: Instant) {
        // Highest-priority permissive member wins if both claim right-of-way.
        let active = self.intersections[idx]
            .priority_order
            .iter()
            .find(|m| self.lights.get(*m).is_some_and(|l| l.is_active()))
            .cloned();

        let active = match active {
            Some(active) => {
                self.intersections[idx].idle_ticks = 0;
                active
            }
            None => {
                let inter = &mut self.intersections[idx];
                inter.idle_ticks += 1;
                if inter.idle_ticks < self.thresholds.watchdog_cycles {
                    return;
                }
                inter.idle_ticks = 0;
                match self.force_head_green(idx, now) {
                    Some(head) => head,
                    None => return,
                }
            }
        };

        self.hold_competitor(idx, &active, now);
    }

    /// Watchdog: neither member has had right-of-way for too long.
    fn force_head_green(&mut self, idx: usize, now: Instant) -> Option<String> {
        let one_way = self.rtt.one_way_ms();
        let inter = &self.intersections[idx];
        let head = inter
            .priority_order
            .iter()
            .find(|m| self.lights.get(*m).is_some_and(|l| !l.is_unknown()))?
            .clone();

        warn!(
            intersection = %inter.name,
            light = %head,
            cycles = self.thresholds.watchdog_cycles,
            "All members RED too long, forcing GREEN"
        );
        let light = self.lights.get_mut(&head)?;
        light.queue([
            Command::SetState(LightState::Green),
            Command::SetCurrentTime(GREEN_BASE_TIME_MS.saturating_sub(one_way)),
        ]);
        light.state = LightState::Green;
        light.set_remaining(now, GREEN_BASE_TIME_MS);
        Some(head)
    }

    /// Keeps the competitor of `active` RED until `active` turns RED.
    fn hold_competitor(&mut self, idx: usize, active: &str, now: Instant) {
        let one_way = self.rtt.one_way_ms();
        let Some((active_left, active_end)) = self
            .lights
            .get(active)
            .map(|l| (l.remaining_ms(now), l.phase_end))
        else {
            return;
        };
        let inter = &self.intersections[idx];
        let Some(other) = inter.other(active) else {
            return;
        };
        let Some(light) = self.lights.get_mut(other) else {
            return;
        };
        if light.is_unknown() {
            return;
        }

        let drift = light.remaining_ms(now).abs_diff(active_left);
        if light.state == LightState::Red && drift <= INTERSECTION_TOLERANCE_MS {
            return;
        }

        let hold = active_left.saturating_sub(one_way);
        debug!(
            intersection = %inter.name,
            active,
            held = other,
            hold_ms = hold,
            "Holding competitor RED"
        );
        light.queue([Command::SetState(LightState::Red), Command::SetCurrentTime(hold)]);
        light.state = LightState::Red;
        light.phase_end = active_end;
    }
}
