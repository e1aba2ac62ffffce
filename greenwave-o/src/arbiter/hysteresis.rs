/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Priority assignment with hysteresis.
//!
//! Each tick every known light is compared with the grid-wide mean
//! priority.  A light persistently above the mean gains green time in
//! [`ADJUST_STEP_MS`] steps, at most [`MAX_ADJUST_STEPS`] in a row; one
//! below the mean cedes it symmetrically.  When the trend flips, the steps
//! already taken are paid down one per tick before any step is taken the
//! other way.
//!
//! ```text
//!            above                above               above (debt=3: hold)
//! Neutral ─────────► Gaining(1) ───────► Gaining(2) ──► Gaining(3)
//!                        │ below
//!                        ▼
//!                    Gaining(0) ── below ──► Ceding(1) ...
//! ```

use std::cmp::Ordering;

use tokio::time::Instant;
use tracing::{debug, info};

use super::Coordinator;
use crate::light::{AdjustDirection, AdjustmentState, LightState, TrafficLight, MIN_PHASE_MS};
use crate::protocol::command::Command;

/// Phase-length change per adjustment step.
pub const ADJUST_STEP_MS: u64 = 5_000;

/// Consecutive steps allowed in one direction.
pub const MAX_ADJUST_STEPS: u8 = 3;

/// RED hold given to a free-standing light found in ALERT.
pub const ALERT_BASELINE_RED_MS: u64 = 15_000;

/// Where a light's priority sits relative to the mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Above,
    Below,
    Level,
}

impl Trend {
    fn of(priority: f64, mean: f64) -> Self {
        match priority.partial_cmp(&mean) {
            Some(Ordering::Greater) => Trend::Above,
            Some(Ordering::Less) => Trend::Below,
            _ => Trend::Level,
        }
    }
}

/// Adjustment to emit this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    /// Longer green, shorter red.
    Gain,
    /// Shorter green, longer red.
    Cede,
}

impl AdjustmentState {
    /// Advances the hysteresis by one observation.
    pub fn observe(&mut self, trend: Trend) -> Option<Nudge> {
        let (toward, away, nudge) = match trend {
            Trend::Level => return None,
            Trend::Above => (AdjustDirection::Gaining, AdjustDirection::Ceding, Nudge::Gain),
            Trend::Below => (AdjustDirection::Ceding, AdjustDirection::Gaining, Nudge::Cede),
        };

        if self.direction == away && self.debt > 0 {
            self.debt -= 1;
            return None;
        }
        if self.direction == toward {
            if self.debt >= MAX_ADJUST_STEPS {
                return None;
            }
            self.debt += 1;
            return Some(nudge);
        }
        self.direction = toward;
        self.debt = 1;
        Some(nudge)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Nudge {
    fn commands(self) -> [Command; 2] {
        match self {
            Nudge::Gain => [
                Command::IncreaseGreenDuration(ADJUST_STEP_MS),
                Command::DecreaseRedDuration(ADJUST_STEP_MS),
            ],
            Nudge::Cede => [
                Command::DecreaseGreenDuration(ADJUST_STEP_MS),
                Command::IncreaseRedDuration(ADJUST_STEP_MS),
            ],
        }
    }

    /// Mirrors the node's duration update, including its refusal to shrink
    /// a phase below [`MIN_PHASE_MS`].
    fn apply_belief(self, light: &mut TrafficLight) {
        let d = &mut light.durations;
        let (grow, shrink) = match self {
            Nudge::Gain => (&mut d.green_ms, &mut d.red_ms),
            Nudge::Cede => (&mut d.red_ms, &mut d.green_ms),
        };
        *grow += ADJUST_STEP_MS;
        if *shrink >= MIN_PHASE_MS + ADJUST_STEP_MS {
            *shrink -= ADJUST_STEP_MS;
        }
    }
}

impl Coordinator {
    pub(super) fn assign_priorities(&mut self, now: Instant) {
        let known: Vec<f64> = self
            .lights
            .values()
            .filter(|l| !l.is_unknown())
            .map(|l| l.priority)
            .collect();
        if known.is_empty() {
            return;
        }
        let mean = known.iter().sum::<f64>() / known.len() as f64;
        let spacing = self.thresholds.nudge_spacing;
        debug!(mean, "Priority mean");

        for light in self.lights.values_mut() {
            if light.is_unknown() {
                continue;
            }

            if light.state == LightState::Alert && !light.membership.intersection {
                info!(light = %light.name, "Restoring free-standing light from ALERT");
                light.pending.clear();
                light.queue([
                    Command::SetDefaultDuration,
                    Command::SetState(LightState::Red),
                    Command::SetCurrentTime(ALERT_BASELINE_RED_MS),
                ]);
                light.durations = light.default_durations;
                light.state = LightState::Red;
                light.set_remaining(now, ALERT_BASELINE_RED_MS);
                light.adjustment.reset();
                continue;
            }

            let mut next = light.adjustment;
            let nudge = next.observe(Trend::of(light.priority, mean));
            let too_soon = light
                .last_nudge
                .is_some_and(|at| now.saturating_duration_since(at) < spacing);
            if nudge.is_some() && too_soon {
                continue;
            }
            light.adjustment = next;

            if let Some(nudge) = nudge {
                debug!(
                    light = %light.name,
                    ?nudge,
                    step = light.adjustment.debt,
                    "Priority adjustment"
                );
                light.queue(nudge.commands());
                nudge.apply_belief(light);
                light.last_nudge = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn above_mean_reaches_and_holds_three_steps() {
        let mut s = AdjustmentState::default();
        let emitted: Vec<_> = (0..6).map(|_| s.observe(Trend::Above)).collect();
        assert_eq!(
            emitted,
            vec![
                Some(Nudge::Gain),
                Some(Nudge::Gain),
                Some(Nudge::Gain),
                None,
                None,
                None
            ]
        );
        assert_eq!(s.debt, MAX_ADJUST_STEPS);
        assert_eq!(s.direction, AdjustDirection::Gaining);
    }

    #[test]
    fn reversal_pays_down_debt_before_ceding() {
        let mut s = AdjustmentState::default();
        s.observe(Trend::Above);
        s.observe(Trend::Above);
        assert_eq!(s.observe(Trend::Below), None);
        assert_eq!(s.observe(Trend::Below), None);
        assert_eq!(s.debt, 0);
        assert_eq!(s.observe(Trend::Below), Some(Nudge::Cede));
        assert_eq!(s.direction, AdjustDirection::Ceding);
        assert_eq!(s.debt, 1);
    }

    #[test]
    fn level_trend_changes_nothing() {
        let mut s = AdjustmentState {
            debt: 2,
            direction: AdjustDirection::Ceding,
        };
        assert_eq!(s.observe(Trend::Level), None);
        assert_eq!(s.debt, 2);
    }

    const PAIR: &str = r#"
traffic-lights:
  - { name: /hot, state: RED, cycle_time: 40 }
  - { name: /cold, state: RED, cycle_time: 40 }
  - { name: /gone, state: RED, cycle_time: 40 }
"#;

    #[test]
    fn busy_light_gains_green_at_most_three_spaced_steps() {
        let t0 = Instant::now();
        let mut c = coordinator(PAIR, t0);
        c.light_mut("/hot").unwrap().priority = 9.0;
        c.light_mut("/cold").unwrap().priority = 1.0;

        // Default spacing: 4 s de-dup window + 1 s poll interval.
        let mut gained_at = Vec::new();
        for second in 0..20 {
            c.assign_priorities(t0 + ms(second * 1_000));
            let batch = drain(&mut c, "/hot");
            if contains_run(
                &batch,
                &[
                    Command::IncreaseGreenDuration(ADJUST_STEP_MS),
                    Command::DecreaseRedDuration(ADJUST_STEP_MS),
                ],
            ) {
                gained_at.push(second);
            }
        }
        assert_eq!(gained_at, vec![0, 5, 10]);
        assert_eq!(c.light("/hot").unwrap().durations.green_ms, 17_000 + 15_000);
        assert_eq!(c.light("/hot").unwrap().adjustment.debt, MAX_ADJUST_STEPS);
    }

    #[test]
    fn debt_pay_down_is_not_delayed_by_spacing() {
        let t0 = Instant::now();
        let mut c = coordinator(PAIR, t0);
        c.light_mut("/hot").unwrap().priority = 9.0;
        c.assign_priorities(t0);
        drain(&mut c, "/hot");

        c.light_mut("/hot").unwrap().priority = 0.0;
        c.light_mut("/cold").unwrap().priority = 9.0;
        c.assign_priorities(t0 + ms(1_000));
        assert!(drain(&mut c, "/hot").is_empty());
        assert_eq!(c.light("/hot").unwrap().adjustment.debt, 0);
    }

    #[test]
    fn quiet_light_cedes_green() {
        let now = Instant::now();
        let mut c = coordinator(PAIR, now);
        c.light_mut("/hot").unwrap().priority = 9.0;
        c.assign_priorities(now);
        assert_eq!(
            drain(&mut c, "/cold"),
            vec![
                Command::DecreaseGreenDuration(ADJUST_STEP_MS),
                Command::IncreaseRedDuration(ADJUST_STEP_MS),
            ]
        );
    }

    #[test]
    fn unknown_lights_are_excluded_from_mean() {
        let now = Instant::now();
        let mut c = coordinator(PAIR, now);
        c.light_mut("/hot").unwrap().priority = 4.0;
        c.light_mut("/cold").unwrap().priority = 4.0;
        let gone = c.light_mut("/gone").unwrap();
        gone.state = LightState::Unknown;
        gone.priority = 100.0;

        c.assign_priorities(now);
        assert!(drain(&mut c, "/hot").is_empty());
        assert!(drain(&mut c, "/cold").is_empty());
        assert!(drain(&mut c, "/gone").is_empty());
    }

    #[test]
    fn free_standing_alert_gets_baseline() {
        let now = Instant::now();
        let mut c = coordinator(PAIR, now);
        let hot = c.light_mut("/hot").unwrap();
        hot.state = LightState::Alert;
        hot.durations.green_ms = 99_000;
        hot.adjustment = AdjustmentState {
            debt: 2,
            direction: AdjustDirection::Gaining,
        };

        c.assign_priorities(now);

        assert_eq!(
            drain(&mut c, "/hot"),
            vec![
                Command::SetDefaultDuration,
                Command::SetState(LightState::Red),
                Command::SetCurrentTime(ALERT_BASELINE_RED_MS),
            ]
        );
        let hot = c.light("/hot").unwrap();
        assert_eq!(hot.state, LightState::Red);
        assert_eq!(hot.durations, hot.default_durations);
        assert_eq!(hot.adjustment, AdjustmentState::default());
        assert_eq!(hot.remaining_ms(now + ms(1_000)), ALERT_BASELINE_RED_MS - 1_000);
    }

    #[test]
    fn alert_baseline_replaces_pending_batch() {
        let now = Instant::now();
        let mut c = coordinator(PAIR, now);
        for i in 0..100 {
            c.light_mut("/hot").unwrap().state = LightState::Alert;
            c.assign_priorities(now + ms(i * 1_000));
        }
        let hot = c.light("/hot").unwrap();
        assert_eq!(
            hot.pending,
            vec![
                Command::SetDefaultDuration,
                Command::SetState(LightState::Red),
                Command::SetCurrentTime(ALERT_BASELINE_RED_MS),
            ]
        );
    }
}
