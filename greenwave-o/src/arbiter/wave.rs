/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Green-wave propagation.
//!
//! When a wave's leader turns GREEN, the member at position `i` should turn
//! GREEN `i × travel_time_ms` later so a platoon leaving the leader meets
//! green all the way down the corridor.  The wave fires once per leader
//! GREEN activation.
//!
//! Intersection members are never switched: that would fight intersection
//! arbitration.  They get their green length preconfigured, and a member
//! already GREEN has its current phase retimed to that length so the
//! arbitration holds its competitor to the wave's timing.

use tokio::time::Instant;
use tracing::{debug, info};

use super::Coordinator;
use crate::light::{LightState, MIN_PHASE_MS};
use crate::protocol::command::Command;

/// Percentage of the leader's green given to a wave member whose
/// intersection competitor currently has the higher priority.
pub const WAVE_COMPETITOR_BIAS: u64 = 70;

/// Remaining RED below which a free-standing follower is switched to GREEN
/// immediately instead of being held.
pub const WAVE_ESCALATE_MS: u64 = 2_000;

/// Leader timing captured at the GREEN edge.
#[derive(Debug, Clone, Copy)]
struct WaveFront {
    /// Leader time until RED.
    until_red: u64,
    /// Leader green time alone.
    green: u64,
    one_way: u64,
}

impl Coordinator {
    pub(super) fn propagate_green_waves(&mut self, now: Instant) {
        let one_way = self.rtt.one_way_ms();

        for idx in 0..self.waves.len() {
            let wave = &self.waves[idx];
            let Some(leader) = self.lights.get(&wave.members[0]) else {
                continue;
            };
            if leader.state != LightState::Green {
                self.waves[idx].triggered = false;
                continue;
            }
            if wave.triggered {
                continue;
            }

            let until_red = leader.remaining_ms(now);
            let front = WaveFront {
                until_red,
                green: until_red.saturating_sub(leader.durations.yellow_ms),
                one_way,
            };
            info!(
                wave = %wave.name,
                leader = %leader.name,
                leader_ms = until_red,
                "Green wave triggered"
            );

            let members: Vec<(u64, String)> = wave
                .members
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, m)| ((i as u64).saturating_mul(wave.travel_time_ms), m.clone()))
                .collect();
            self.waves[idx].triggered = true;

            for (offset, member) in members {
                let (unknown, in_intersection) = match self.lights.get(&member) {
                    Some(l) => (l.is_unknown(), l.membership.intersection),
                    None => continue,
                };
                if unknown {
                    continue;
                }
                if in_intersection {
                    self.preconfigure_wave_green(&member, &front, now);
                } else {
                    self.align_free_member(&member, offset, &front, now);
                }
            }
        }
    }

    /// Update for an intersection member: its green length, plus the
    /// remaining time of a green already showing.
    fn preconfigure_wave_green(&mut self, member: &str, front: &WaveFront, now: Instant) {
        let competitor_priority = self
            .intersection_of(member)
            .and_then(|i| self.intersections[i].other(member))
            .and_then(|other| self.lights.get(other))
            .map(|l| l.priority);
        let Some(light) = self.lights.get_mut(member) else {
            return;
        };

        let mut green = front.green;
        if competitor_priority.is_some_and(|p| p > light.priority) {
            green = green * WAVE_COMPETITOR_BIAS / 100;
        }
        let green = green.max(MIN_PHASE_MS);

        debug!(light = member, green_ms = green, "Preconfiguring wave green");
        light.queue([Command::SetGreenDuration(green)]);
        light.durations.green_ms = green;

        if light.state == LightState::Green {
            let until_red = green.saturating_add(light.durations.yellow_ms);
            light.queue([
                Command::IfState(LightState::Green),
                Command::SetCurrentTime(until_red.saturating_sub(front.one_way)),
            ]);
            light.set_remaining(now, until_red);
        }
    }

    /// Aligns a free-standing member so its green ends `offset` after the
    /// leader's.
    fn align_free_member(&mut self, member: &str, offset: u64, front: &WaveFront, now: Instant) {
        let Some(light) = self.lights.get_mut(member) else {
            return;
        };
        let target_end = front.until_red.saturating_add(offset);
        let green = front.green.max(MIN_PHASE_MS);

        match light.state {
            LightState::Green => {
                light.queue([Command::SetCurrentTime(
                    target_end.saturating_sub(front.one_way),
                )]);
                light.set_remaining(now, target_end);
            }
            LightState::Red if light.remaining_ms(now) <= WAVE_ESCALATE_MS => {
                light.queue([
                    Command::IfState(LightState::Red),
                    Command::SetState(LightState::Green),
                    Command::SetCurrentTime(target_end.saturating_sub(front.one_way)),
                ]);
                light.state = LightState::Green;
                light.set_remaining(now, target_end);
            }
            LightState::Red => {
                light.queue([
                    Command::SetCurrentTime(offset.saturating_sub(front.one_way)),
                    Command::SetGreenDuration(green),
                ]);
                light.set_remaining(now, offset);
                light.durations.green_ms = green;
            }
            LightState::Yellow => {
                light.queue([Command::SetGreenDuration(green)]);
                light.durations.green_ms = green;
            }
            LightState::Alert | LightState::Unknown => return,
        }
        debug!(light = member, offset, "Aligned wave member");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    const AVENUE: &str = r#"
traffic-lights:
  - { name: /w0, state: RED, cycle_time: 60 }
  - { name: /w1, state: RED, cycle_time: 60 }
  - { name: /w2, state: GREEN, cycle_time: 60 }
  - { name: /x1, state: RED, cycle_time: 60 }
intersections:
  - name: x
    traffic-lights: [/w1, /x1]
green_waves:
  - name: avenue
    traffic_lights: [/w0, /w1, /w2]
    travel_time_ms: 5000
"#;

    fn leader_turns_green(c: &mut Coordinator, t0: Instant, remaining: u64) {
        let leader = c.light_mut("/w0").unwrap();
        leader.state = LightState::Green;
        leader.set_remaining(t0, remaining);
    }

    #[test]
    fn green_follower_two_hops_away_is_offset_by_two_travel_times() {
        let t0 = Instant::now();
        let mut c = coordinator(AVENUE, t0);
        leader_turns_green(&mut c, t0, 20_000);

        c.propagate_green_waves(t0);

        assert_eq!(drain(&mut c, "/w2"), vec![Command::SetCurrentTime(30_000)]);
        assert_eq!(c.light("/w2").unwrap().remaining_ms(t0), 30_000);
    }

    #[test]
    fn red_follower_held_for_offset_then_given_leader_green() {
        let t0 = Instant::now();
        let mut c = coordinator(AVENUE, t0);
        let w2 = c.light_mut("/w2").unwrap();
        w2.state = LightState::Red;
        w2.set_remaining(t0, 25_000);
        leader_turns_green(&mut c, t0, 20_000);

        c.propagate_green_waves(t0);

        assert_eq!(
            drain(&mut c, "/w2"),
            vec![
                Command::SetCurrentTime(10_000),
                Command::SetGreenDuration(17_000),
            ]
        );
    }

    #[test]
    fn nearly_expired_red_follower_is_escalated() {
        let t0 = Instant::now();
        let mut c = coordinator(AVENUE, t0);
        let w2 = c.light_mut("/w2").unwrap();
        w2.state = LightState::Red;
        w2.set_remaining(t0, 1_500);
        leader_turns_green(&mut c, t0, 20_000);

        c.propagate_green_waves(t0);

        assert_eq!(
            drain(&mut c, "/w2"),
            vec![
                Command::IfState(LightState::Red),
                Command::SetState(LightState::Green),
                Command::SetCurrentTime(30_000),
            ]
        );
    }

    #[test]
    fn intersection_member_gets_soft_green_biased_by_competitor() {
        let t0 = Instant::now();
        let mut c = coordinator(AVENUE, t0);
        c.light_mut("/x1").unwrap().priority = 9.0;
        c.light_mut("/w1").unwrap().priority = 1.0;
        leader_turns_green(&mut c, t0, 20_000);

        c.propagate_green_waves(t0);

        // Leader green is 17 000 ms; competitor is busier.
        assert_eq!(drain(&mut c, "/w1"), vec![Command::SetGreenDuration(11_900)]);
        assert!(drain(&mut c, "/x1").is_empty());
    }

    #[test]
    fn wave_fires_once_per_leader_green() {
        let t0 = Instant::now();
        let mut c = coordinator(AVENUE, t0);
        leader_turns_green(&mut c, t0, 20_000);

        c.propagate_green_waves(t0);
        drain(&mut c, "/w2");
        c.propagate_green_waves(t0 + ms(1_000));
        assert!(drain(&mut c, "/w2").is_empty());

        c.light_mut("/w0").unwrap().state = LightState::Yellow;
        c.propagate_green_waves(t0 + ms(2_000));
        leader_turns_green(&mut c, t0 + ms(3_000), 20_000);
        c.propagate_green_waves(t0 + ms(3_000));
        assert!(!drain(&mut c, "/w2").is_empty());
    }

    #[test]
    fn green_intersection_member_is_retimed_to_wave_green() {
        let t0 = Instant::now();
        let mut c = coordinator(AVENUE, t0);
        let w1 = c.light_mut("/w1").unwrap();
        w1.state = LightState::Green;
        w1.set_remaining(t0, 40_000);
        c.light_mut("/x1").unwrap().priority = 9.0;
        leader_turns_green(&mut c, t0, 20_000);

        c.propagate_green_waves(t0);

        assert_eq!(
            drain(&mut c, "/w1"),
            vec![
                Command::SetGreenDuration(11_900),
                Command::IfState(LightState::Green),
                Command::SetCurrentTime(14_900),
            ]
        );
        let w1 = c.light("/w1").unwrap();
        assert_eq!(w1.durations.green_ms, 11_900);
        assert_eq!(w1.remaining_ms(t0), 14_900);
    }
}
