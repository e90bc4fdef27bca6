use crate::{
    Error,
    Result,
    ledger::Chest,
};
use serde::Serialize;
use std::time::Duration;

/// Blocks after purchase during which a chest can still be claimed.
pub const CLAIM_WINDOW_BLOCKS: u64 = 256;
pub const DEFAULT_SECONDS_PER_BLOCK: u64 = 2;

/// How long a chest stays claimable, and the block time used to turn that into seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimWindow {
    pub max_blocks: u64,
    pub seconds_per_block: u64,
}

impl Default for ClaimWindow {
    fn default() -> Self {
        Self {
            max_blocks: CLAIM_WINDOW_BLOCKS,
            seconds_per_block: DEFAULT_SECONDS_PER_BLOCK,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Deadline {
    Active { blocks_left: u64 },
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Urgency {
    Relaxed,
    Warning,
    Critical,
}

pub fn remaining(chest: &Chest, current_height: u64, max_blocks: u64) -> Deadline {
    remaining_since(chest.purchase_block, current_height, max_blocks)
}

/// Same as [`remaining`] for a purchase known only by its block.
pub fn remaining_since(purchase_block: u64, current_height: u64, max_blocks: u64) -> Deadline {
    let closes_at = purchase_block.saturating_add(max_blocks);
    match closes_at.checked_sub(current_height) {
        Some(blocks_left) if blocks_left > 0 => Deadline::Active { blocks_left },
        _ => Deadline::Expired,
    }
}

/// Display-only estimate; expiry itself is always decided by block count.
pub fn estimated_seconds(blocks_left: u64, seconds_per_block: u64) -> Duration {
    Duration::from_secs(blocks_left.saturating_mul(seconds_per_block))
}

pub fn urgency(blocks_left: u64) -> Urgency {
    match blocks_left {
        0..=50 => Urgency::Critical,
        51..=100 => Urgency::Warning,
        _ => Urgency::Relaxed,
    }
}

/// Last chain height seen by the poller. Failed samples leave it untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeightTracker {
    last_known: Option<u64>,
}

impl HeightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_known(&self) -> Option<u64> {
        self.last_known
    }

    pub fn observe(&mut self, sample: Result<u64, String>) -> Result<u64> {
        match sample {
            Ok(height) => {
                let height = match self.last_known {
                    Some(known) if known > height => {
                        tracing::debug!(known, height, "ignoring stale height sample");
                        known
                    }
                    _ => height,
                };
                self.last_known = Some(height);
                Ok(height)
            }
            Err(cause) => {
                tracing::warn!(%cause, last_known = ?self.last_known, "height source failed");
                Err(Error::HeightUnavailable(cause))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::chest;

    #[test]
    fn remaining__before_window_closes__is_active() {
        // given
        let chest = chest(1, 1_000);

        // when
        let deadline = remaining(&chest, 1_100, CLAIM_WINDOW_BLOCKS);

        // then
        assert_eq!(deadline, Deadline::Active { blocks_left: 156 });
    }

    #[test]
    fn remaining__last_claimable_block__has_one_block_left() {
        let deadline = remaining(&chest(1, 1_000), 1_255, CLAIM_WINDOW_BLOCKS);

        assert_eq!(deadline, Deadline::Active { blocks_left: 1 });
    }

    #[test]
    fn remaining__zero_blocks_left__is_expired() {
        let deadline = remaining(&chest(1, 1_000), 1_256, CLAIM_WINDOW_BLOCKS);

        assert_eq!(deadline, Deadline::Expired);
    }

    #[test]
    fn remaining__far_past_window__is_expired() {
        let deadline = remaining(&chest(1, 1_000), 9_999, CLAIM_WINDOW_BLOCKS);

        assert_eq!(deadline, Deadline::Expired);
    }

    #[test]
    fn remaining_since__agrees_with_chest_deadline() {
        for height in [1_000, 1_255, 1_256, 5_000] {
            assert_eq!(
                remaining_since(1_000, height, CLAIM_WINDOW_BLOCKS),
                remaining(&chest(9, 1_000), height, CLAIM_WINDOW_BLOCKS)
            );
        }
    }

    #[test]
    fn estimated_seconds__scales_by_block_time() {
        assert_eq!(estimated_seconds(156, 2), Duration::from_secs(312));
    }

    #[test]
    fn urgency__follows_block_thresholds() {
        assert_eq!(urgency(50), Urgency::Critical);
        assert_eq!(urgency(51), Urgency::Warning);
        assert_eq!(urgency(100), Urgency::Warning);
        assert_eq!(urgency(101), Urgency::Relaxed);
    }

    #[test]
    fn observe__failed_sample__keeps_last_known_height() {
        // given
        let mut tracker = HeightTracker::new();
        tracker.observe(Ok(500)).unwrap();

        // when
        let result = tracker.observe(Err("rpc timeout".to_string()));

        // then
        assert_eq!(
            result,
            Err(Error::HeightUnavailable("rpc timeout".to_string()))
        );
        assert_eq!(tracker.last_known(), Some(500));
    }

    #[test]
    fn observe__lower_height__does_not_move_backwards() {
        // given
        let mut tracker = HeightTracker::new();
        tracker.observe(Ok(500)).unwrap();

        // when
        let height = tracker.observe(Ok(498)).unwrap();

        // then
        assert_eq!(height, 500);
        assert_eq!(tracker.last_known(), Some(500));
    }
}
