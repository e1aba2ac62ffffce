/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fault model: transport outcomes of status polls.
//!
//! | event | effect |
//! |---|---|
//! | response | belief refreshed, timeout counter cleared, recovery checked |
//! | nack | light UNKNOWN, its intersection compromised |
//! | timeout | counter += 1; at `timeouts_to_unknown` treated as a nack |
//!
//! Outcomes for polls that are not in flight (late or unsolicited) are
//! ignored.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Coordinator;
use crate::light::LightState;
use crate::protocol::StatusReport;

impl Coordinator {
    /// Applies a status answer received at `now`.
    ///
    /// Returns the measured round trip in milliseconds, or `None` if the
    /// answer was not expected.
    pub fn on_status(&mut self, name: &str, payload: &str, now: Instant) -> Option<u64> {
        let Some(sent_at) = self.in_flight.remove(name) else {
            debug!(light = name, "Ignoring status with no poll in flight");
            return None;
        };
        let rtt_ms = self.rtt.record(now.saturating_duration_since(sent_at));
        if let Some(light) = self.lights.get_mut(name) {
            light.consecutive_timeouts = 0;
        }

        let report = match StatusReport::parse(payload) {
            Ok(report) => report,
            Err(e) => {
                warn!(light = name, error = %e, "Discarding malformed status");
                return Some(rtt_ms);
            }
        };

        let one_way = self.rtt.one_way_ms();
        let Some(light) = self.lights.get_mut(name) else {
            return Some(rtt_ms);
        };

        let was_unknown = light.is_unknown();
        light.state = report.state;
        light.set_remaining(now, report.remaining_ms.saturating_sub(one_way));
        light.priority = report.priority;

        debug!(
            light = name,
            state = %report.state,
            remaining_ms = report.remaining_ms,
            priority = report.priority,
            rtt_ms,
            "Status"
        );

        if was_unknown {
            info!(light = name, state = %report.state, "Light reachable again");
            self.check_recovery(name);
        }
        Some(rtt_ms)
    }

    pub fn on_nack(&mut self, name: &str, reason: &str) {
        self.in_flight.remove(name);
        warn!(light = name, reason, "Status poll refused");
        self.mark_unknown(name);
    }

    pub fn on_timeout(&mut self, name: &str) {
        self.in_flight.remove(name);
        let threshold = self.thresholds.timeouts_to_unknown;
        let Some(light) = self.lights.get_mut(name) else {
            return;
        };
        light.consecutive_timeouts += 1;
        debug!(
            light = name,
            consecutive = light.consecutive_timeouts,
            "Status poll timed out"
        );
        if light.consecutive_timeouts >= threshold {
            self.mark_unknown(name);
        }
    }

    fn mark_unknown(&mut self, name: &str) {
        let Some(light) = self.lights.get_mut(name) else {
            return;
        };
        if !light.is_unknown() {
            warn!(light = name, last_state = %light.state, "Light unreachable, now UNKNOWN");
        }
        light.state = LightState::Unknown;

        if let Some(idx) = self.intersection_of(name) {
            let inter = &mut self.intersections[idx];
            if !inter.compromised {
                warn!(intersection = %inter.name, light = name, "Intersection compromised");
            }
            inter.compromised = true;
            inter.needs_normalization = false;
        }
    }

    /// Clears the compromise once every member of `name`'s intersection
    /// answers again, and schedules normalization.
    fn check_recovery(&mut self, name: &str) {
        let Some(idx) = self.intersection_of(name) else {
            return;
        };
        let inter = &self.intersections[idx];
        if !inter.compromised {
            return;
        }
        let healthy = inter
            .members
            .iter()
            .all(|m| self.lights.get(m).is_some_and(|l| !l.is_unknown()));
        if !healthy {
            return;
        }

        let inter = &mut self.intersections[idx];
        info!(intersection = %inter.name, "Intersection recovered, normalizing next tick");
        inter.compromised = false;
        inter.needs_normalization = true;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    const CROSS: &str = r#"
traffic-lights:
  - { name: /l1, state: GREEN, cycle_time: 30 }
  - { name: /l2, state: RED, cycle_time: 30 }
  - { name: /solo, state: RED, cycle_time: 30 }
intersections:
  - name: x
    traffic-lights: [/l1, /l2]
"#;

    #[test]
    fn status_corrects_remaining_by_one_way_latency() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        report(&mut c, "/l1", "YELLOW|2500|4.25", t0, ms(300));

        let l1 = c.light("/l1").unwrap();
        assert_eq!(l1.state, LightState::Yellow);
        assert_eq!(l1.remaining_ms(t0 + ms(300)), 2_350);
        assert!((l1.priority - 4.25).abs() < f64::EPSILON);
        assert_eq!(c.rtt().average_ms(), 300);
    }

    #[test]
    fn malformed_status_keeps_last_belief() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        c.on_timeout("/l1");
        report(&mut c, "/l1", "GREEN;oops", t0, ms(10));
        let l1 = c.light("/l1").unwrap();
        assert_eq!(l1.state, LightState::Green);
        assert_eq!(l1.consecutive_timeouts, 0);
        assert_eq!(c.rtt().len(), 1);
    }

    #[test]
    fn unknown_reported_by_node_is_discarded() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        report(&mut c, "/l2", "UNKNOWN|0|0", t0, ms(10));
        assert_eq!(c.light("/l2").unwrap().state, LightState::Red);
        assert!(!c.intersection("x").unwrap().compromised);
    }

    #[test]
    fn late_status_is_ignored() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        assert!(c.begin_poll("/l2", t0));
        c.on_timeout("/l2");
        assert_eq!(c.on_status("/l2", "GREEN|100|1", t0 + ms(3_000)), None);
        assert_eq!(c.light("/l2").unwrap().state, LightState::Red);
    }

    #[test]
    fn nack_marks_unknown_and_compromises_intersection() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        assert!(c.begin_poll("/l1", t0));
        c.on_nack("/l1", "no route");

        assert!(c.light("/l1").unwrap().is_unknown());
        assert!(c.intersection("x").unwrap().compromised);
        assert!(c.begin_poll("/l1", t0));
    }

    #[test]
    fn single_timeout_is_tolerated_and_success_clears_it() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        c.on_timeout("/solo");
        assert_eq!(c.light("/solo").unwrap().state, LightState::Red);
        report(&mut c, "/solo", "RED|1000|0", t0, ms(0));
        assert_eq!(c.light("/solo").unwrap().consecutive_timeouts, 0);

        c.on_timeout("/solo");
        assert!(!c.light("/solo").unwrap().is_unknown());
        c.on_timeout("/solo");
        assert!(c.light("/solo").unwrap().is_unknown());
    }

    #[test]
    fn recovery_waits_for_every_member() {
        let t0 = Instant::now();
        let mut c = coordinator(CROSS, t0);
        c.on_nack("/l1", "no route");
        c.on_nack("/l2", "no route");

        report(&mut c, "/l1", "RED|1000|0", t0, ms(0));
        assert!(c.intersection("x").unwrap().compromised);

        report(&mut c, "/l2", "ALERT|0|0", t0, ms(0));
        let inter = c.intersection("x").unwrap();
        assert!(!inter.compromised);
        assert!(inter.needs_normalization);
    }
}
