/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Synthetic vehicle load at one approach.

use rand::rngs::StdRng;
use rand::Rng;

use greenwave_o::config::Intensity;

/// Weight of a full queue in the priority score.
const QUEUE_WEIGHT: f64 = 10.0;

/// Weight of each vehicle seen during the current cycle.
const CYCLE_VEHICLE_WEIGHT: f64 = 0.5;

#[derive(Debug)]
pub struct TrafficSim {
    queued: u32,
    cycle_vehicles: u32,
    /// Vehicles that can leave per tick at most.
    lanes: u32,
    capacity: u32,
    intensity: Intensity,
    rng: StdRng,
}

impl TrafficSim {
    pub fn new(lanes: u32, capacity: u32, intensity: Intensity, rng: StdRng) -> Self {
        Self {
            queued: 0,
            cycle_vehicles: 0,
            lanes,
            capacity,
            intensity,
            rng,
        }
    }

    /// One arrival attempt.  Returns `true` if a vehicle joined the queue.
    pub fn arrive(&mut self) -> bool {
        let draw: u32 = self.rng.random_range(1..=10);
        if draw < self.intensity.weight() && self.queued < self.capacity {
            self.queued += 1;
            self.cycle_vehicles += 1;
            true
        } else {
            false
        }
    }

    /// Lets a random batch of up to `min(queued, lanes)` vehicles leave.
    pub fn drain(&mut self) -> u32 {
        let max = self.queued.min(self.lanes);
        let left = if max == 0 {
            0
        } else {
            self.rng.random_range(0..=max)
        };
        self.queued -= left;
        left
    }

    pub fn reset_cycle(&mut self) {
        self.cycle_vehicles = 0;
    }

    pub fn queued(&self) -> u32 {
        self.queued
    }

    pub fn cycle_vehicles(&self) -> u32 {
        self.cycle_vehicles
    }

    /// `cycle_vehicles × 0.5 + (queued / capacity) × 10`; a zero capacity
    /// contributes nothing.
    pub fn score(&self) -> f64 {
        let load = if self.capacity == 0 {
            0.0
        } else {
            f64::from(self.queued) / f64::from(self.capacity)
        };
        f64::from(self.cycle_vehicles) * CYCLE_VEHICLE_WEIGHT + load * QUEUE_WEIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sim(capacity: u32, intensity: Intensity) -> TrafficSim {
        TrafficSim::new(2, capacity, intensity, StdRng::seed_from_u64(7))
    }

    #[test]
    fn queue_never_exceeds_capacity() {
        let mut s = sim(4, Intensity::High);
        for _ in 0..200 {
            s.arrive();
        }
        assert_eq!(s.queued(), 4);
    }

    #[test]
    fn no_intensity_never_arrives() {
        // Weight 1: a draw in 1..=10 is never below it.
        let mut s = sim(10, Intensity::None);
        assert!((0..200).all(|_| !s.arrive()));
    }

    #[test]
    fn drain_is_bounded_by_lanes() {
        let mut s = sim(10, Intensity::High);
        for _ in 0..200 {
            s.arrive();
        }
        for _ in 0..50 {
            let before = s.queued();
            let left = s.drain();
            assert!(left <= 2);
            assert_eq!(s.queued(), before - left);
        }
    }

    #[test]
    fn score_combines_cycle_count_and_queue_load() {
        let mut s = sim(10, Intensity::High);
        while s.queued() < 5 {
            s.arrive();
        }
        // Five arrivals, half the queue.
        assert!((s.score() - (5.0 * 0.5 + 5.0)).abs() < 1e-9);
        s.reset_cycle();
        assert!((s.score() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_capacity_scores_zero() {
        let s = sim(0, Intensity::High);
        assert_eq!(s.score(), 0.0);
    }
}
