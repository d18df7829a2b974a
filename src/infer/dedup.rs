//! Repeat-detection suppression.
//!
//! A fire that stays in view produces a stream of near-identical frames;
//! only the first one should page anyone. The window remembers the exact
//! content hash of every frame that raised an event. When no new event
//! has arrived for longer than the quiet period, the whole window is
//! forgotten at once, so a still-burning scene alerts again rather than
//! staying silent forever.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Seconds without a new event after which the window resets.
pub const QUIET_PERIOD_S: u64 = 60;

pub fn content_hash(payload: &[u8]) -> [u8; 32] {
    Sha256::digest(payload).into()
}

pub struct DedupWindow {
    seen: HashSet<[u8; 32]>,
    last_event_epoch_s: Option<u64>,
    quiet_period_s: u64,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::with_quiet_period(QUIET_PERIOD_S)
    }

    pub fn with_quiet_period(quiet_period_s: u64) -> Self {
        Self {
            seen: HashSet::new(),
            last_event_epoch_s: None,
            quiet_period_s,
        }
    }

    /// Forget every seen hash once the quiet period has passed. The
    /// reference time is the last NEW event; suppressed repeats do not
    /// keep the window alive.
    pub fn expire_if_quiet(&mut self, now_s: u64) {
        let Some(last) = self.last_event_epoch_s else {
            return;
        };
        if now_s.saturating_sub(last) > self.quiet_period_s && !self.seen.is_empty() {
            log::debug!(
                "dedup window quiet for over {}s, dropping {} seen hashes",
                self.quiet_period_s,
                self.seen.len()
            );
            self.seen.clear();
        }
    }

    /// Record a scene hash. True when it starts a new event.
    pub fn register(&mut self, hash: [u8; 32], now_s: u64) -> bool {
        if self.seen.insert(hash) {
            self.last_event_epoch_s = Some(now_s);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_a_new_event() {
        let mut window = DedupWindow::new();
        window.expire_if_quiet(1000);
        assert!(window.register(content_hash(b"scene-a"), 1000));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn repeat_sighting_is_suppressed() {
        let mut window = DedupWindow::new();
        let hash = content_hash(b"scene-a");
        assert!(window.register(hash, 1000));
        window.expire_if_quiet(1030);
        assert!(!window.register(hash, 1030));
    }

    #[test]
    fn window_resets_after_the_quiet_period() {
        let mut window = DedupWindow::new();
        let hash = content_hash(b"scene-a");
        assert!(window.register(hash, 1000));
        window.expire_if_quiet(1061);
        assert!(window.is_empty());
        assert!(window.register(hash, 1061));
    }

    #[test]
    fn exactly_the_quiet_period_does_not_reset() {
        let mut window = DedupWindow::new();
        let hash = content_hash(b"scene-a");
        assert!(window.register(hash, 1000));
        window.expire_if_quiet(1060);
        assert!(!window.register(hash, 1060));
    }

    #[test]
    fn suppressed_repeats_do_not_extend_the_window() {
        let mut window = DedupWindow::new();
        let hash = content_hash(b"scene-a");
        assert!(window.register(hash, 1000));
        // A repeat at 1030 must not move the reference time.
        window.expire_if_quiet(1030);
        assert!(!window.register(hash, 1030));
        window.expire_if_quiet(1061);
        assert!(window.register(hash, 1061));
    }

    #[test]
    fn distinct_scenes_are_distinct_events() {
        let mut window = DedupWindow::new();
        assert!(window.register(content_hash(b"scene-a"), 1000));
        assert!(window.register(content_hash(b"scene-b"), 1001));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash(b"frame"), content_hash(b"frame"));
        assert_ne!(content_hash(b"frame"), content_hash(b"frame2"));
    }
}
