//! Screen stability detection

use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks how long a sampled surface has stayed unchanged
#[derive(Debug, Default)]
pub struct StabilityTracker {
    last: Option<(String, Instant)>,
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample; returns how long the current content has been unchanged
    pub fn observe(&mut self, content: &[u8], now: Instant) -> Duration {
        self.observe_hash(hash_content(content), now)
    }

    /// Record a precomputed hash
    pub fn observe_hash(&mut self, hash: String, now: Instant) -> Duration {
        match &self.last {
            Some((previous, since)) if *previous == hash => now.duration_since(*since),
            _ => {
                self.last = Some((hash, now));
                Duration::ZERO
            }
        }
    }
}

pub fn hash_content(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_content_accumulates() {
        let start = Instant::now();
        let mut tracker = StabilityTracker::new();

        assert_eq!(tracker.observe(b"frame", start), Duration::ZERO);
        assert_eq!(
            tracker.observe(b"frame", start + Duration::from_millis(80)),
            Duration::from_millis(80)
        );
    }

    #[test]
    fn test_change_resets_the_clock() {
        let start = Instant::now();
        let mut tracker = StabilityTracker::new();

        tracker.observe(b"spinner |", start);
        tracker.observe(b"spinner /", start + Duration::from_millis(50));
        assert_eq!(
            tracker.observe(b"spinner /", start + Duration::from_millis(120)),
            Duration::from_millis(70)
        );
    }
}
