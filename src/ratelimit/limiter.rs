//! Core sliding-window limiter implementation.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::client_key::ClientKey;
use super::window::ClientWindow;
use crate::error::{Result, TurnstileError};

/// Default rolling window when no specific window is configured.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default admissions per window when no specific limit is configured.
pub const DEFAULT_MAX_REQUESTS: u32 = 5;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was admitted and its timestamp recorded.
    Admit,
    /// The quota for the window is exhausted; nothing was recorded.
    Reject,
}

impl Decision {
    /// Whether this decision lets the request through.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Validated limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    window: Duration,
    max_requests: u32,
}

impl LimiterSettings {
    /// Create settings, failing on a zero-length window.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        if window.is_zero() {
            return Err(TurnstileError::Config(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            window,
            max_requests,
        })
    }

    /// Length of the rolling window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admissions allowed per key within any window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

/// Per-client sliding-window limiter.
///
/// Holds the registry of client windows. The check-evict-append sequence for
/// a key runs under that key's shard write guard, so concurrent callers on
/// the same key cannot both take the last slot. Share it behind an `Arc`.
pub struct SlidingWindowLimiter {
    settings: LimiterSettings,
    /// Client windows indexed by client key
    windows: DashMap<ClientKey, ClientWindow>,
}

impl SlidingWindowLimiter {
    /// Create a limiter from validated settings.
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            settings,
            windows: DashMap::new(),
        }
    }

    /// Create a limiter from raw limits, validating them first.
    pub fn with_limits(window: Duration, max_requests: u32) -> Result<Self> {
        LimiterSettings::new(window, max_requests).map(Self::new)
    }

    /// The settings this limiter was built with.
    pub fn settings(&self) -> LimiterSettings {
        self.settings
    }

    /// Decide whether a request from `key` at `now` is admitted.
    ///
    /// `now` must be non-decreasing per key. A `now` earlier than the newest
    /// recorded timestamp for that key is rejected without touching state.
    pub fn check_and_record(&self, key: &ClientKey, now: Instant) -> Decision {
        trace!(key = %key, "Checking sliding window");

        if self.settings.max_requests == 0 {
            debug!(key = %key, "Rejecting request, limiter admits nothing");
            return Decision::Reject;
        }

        let mut window = self.windows.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                window = ?self.settings.window,
                max_requests = self.settings.max_requests,
                "Creating new client window"
            );
            ClientWindow::new()
        });

        if window.is_out_of_order(now) {
            debug!(key = %key, "Rejecting out-of-order timestamp");
            return Decision::Reject;
        }

        if window.try_admit(now, self.settings.window, self.settings.max_requests) {
            Decision::Admit
        } else {
            debug!(
                key = %key,
                retry_after = ?window.duration_until_slot(now, self.settings.window),
                "Sliding window limit exceeded"
            );
            Decision::Reject
        }
    }

    /// Admissions left for `key` at `now`, without recording anything.
    pub fn remaining(&self, key: &ClientKey, now: Instant) -> u32 {
        let used = self
            .windows
            .get(key)
            .map(|window| window.active_count(now, self.settings.window))
            .unwrap_or(0);
        self.settings.max_requests.saturating_sub(used as u32)
    }

    /// Number of stored timestamps for `key`, if it has a window.
    pub fn window_len(&self, key: &ClientKey) -> Option<usize> {
        self.windows.get(key).map(|window| window.len())
    }

    /// Evict stale timestamps everywhere and drop windows left empty.
    ///
    /// Returns the number of removed client keys.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let window_len = self.settings.window;
        let mut removed = 0;

        self.windows.retain(|_, window| {
            window.evict_expired(now, window_len);
            let keep = !window.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Get the number of tracked client keys.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(LimiterSettings::default())
    }
}
