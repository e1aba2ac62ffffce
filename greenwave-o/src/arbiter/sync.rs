/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Sync groups: followers mirror their leader.

use tokio::time::Instant;
use tracing::debug;

use super::Coordinator;
use crate::protocol::command::Command;

/// Remaining-time gap a follower may drift from its leader.
pub const SYNC_TOLERANCE_MS: u64 = 1_000;

impl Coordinator {
    pub(super) fn sync_followers(&mut self, now: Instant) {
        let one_way = self.rtt.one_way_ms();

        for group in &self.sync_groups {
            let Some(leader) = self.lights.get(&group.members[0]) else {
                continue;
            };
            if leader.is_unknown() {
                continue;
            }
            let (state, phase_end) = (leader.state, leader.phase_end);
            let leader_left = leader.remaining_ms(now);

            for name in &group.members[1..] {
                let Some(follower) = self.lights.get_mut(name) else {
                    continue;
                };
                if follower.is_unknown() {
                    continue;
                }
                let gap = follower.remaining_ms(now).abs_diff(leader_left);
                if follower.state == state && gap <= SYNC_TOLERANCE_MS {
                    continue;
                }

                debug!(
                    group = %group.name,
                    follower = %name,
                    %state,
                    gap,
                    "Mirroring sync leader"
                );
                follower.queue([
                    Command::SetState(state),
                    Command::SetCurrentTime(leader_left.saturating_sub(one_way)),
                ]);
                follower.state = state;
                follower.phase_end = phase_end;
            }
        }
    }
}
