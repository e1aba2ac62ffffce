/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Sliding-window round-trip estimator.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples kept.
pub const RTT_WINDOW_SIZE: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    window: VecDeque<u64>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes one sample, evicting the oldest once the window is full.
    /// Returns the sample in milliseconds.
    pub fn record(&mut self, rtt: Duration) -> u64 {
        let ms = rtt.as_millis() as u64;
        if self.window.len() == RTT_WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(ms);
        ms
    }

    /// Integer mean of the window; 0 when empty.
    pub fn average_ms(&self) -> u64 {
        if self.window.is_empty() {
            return 0;
        }
        self.window.iter().sum::<u64>() / self.window.len() as u64
    }

    /// Half the mean round trip.
    pub fn one_way_ms(&self) -> u64 {
        self.average_ms() / 2
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
