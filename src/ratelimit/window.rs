//! Per-client sliding window of admitted request timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling record of admitted requests for a single client key.
///
/// Timestamps are stored oldest first and never go backwards: a `now` earlier
/// than the newest stored timestamp is refused. Entries exactly `window` old
/// are outside the window.
#[derive(Debug, Default, Clone)]
pub struct ClientWindow {
    admitted: VecDeque<Instant>,
}

impl ClientWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `now` is earlier than the newest stored timestamp.
    pub fn is_out_of_order(&self, now: Instant) -> bool {
        self.admitted.back().is_some_and(|&newest| now < newest)
    }

    /// Drop every entry with `now - ts >= window`.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_expired(&mut self, now: Instant, window: Duration) -> usize {
        let mut evicted = 0;
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.admitted.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Evict, then admit `now` if fewer than `max_requests` entries remain.
    ///
    /// Returns `true` when the request was admitted and recorded. An
    /// out-of-order `now` is refused and leaves the window untouched.
    pub fn try_admit(&mut self, now: Instant, window: Duration, max_requests: u32) -> bool {
        if self.is_out_of_order(now) {
            return false;
        }
        self.evict_expired(now, window);

        if self.admitted.len() >= max_requests as usize {
            return false;
        }

        self.admitted.push_back(now);
        true
    }

    /// Number of entries still inside the window at `now`, without mutating.
    pub fn active_count(&self, now: Instant, window: Duration) -> usize {
        self.admitted
            .iter()
            .filter(|&&ts| now.saturating_duration_since(ts) < window)
            .count()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    /// Time until the oldest stored entry leaves the window.
    ///
    /// `Duration::ZERO` when the window is empty or the entry is already stale.
    pub fn duration_until_slot(&self, now: Instant, window: Duration) -> Duration {
        match self.admitted.front() {
            Some(&oldest) => window.saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        }
    }
}
