// Broadcast rate limiting
//
// Per-sender sliding window. A sender may emit at most `max_per_window` alerts
// within any `window`; older send instants are pruned on each check.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Recent send instants for a single sender.
struct SendWindow {
    sent: VecDeque<Instant>,
}

impl SendWindow {
    fn new() -> Self {
        Self {
            sent: VecDeque::new(),
        }
    }

    /// Prune instants outside the window, then record `now` if under the limit.
    fn try_record(&mut self, now: Instant, window: Duration, max_per_window: usize) -> bool {
        while let Some(&oldest) = self.sent.front() {
            if now.duration_since(oldest) >= window {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        if self.sent.len() >= max_per_window {
            return false;
        }
        self.sent.push_back(now);
        true
    }
}

/// Per-sender sliding-window rate limiter.
///
/// Windows are created lazily on first send. State is in-memory only.
pub struct RateLimiter {
    windows: DashMap<String, SendWindow>,
    window: Duration,
    max_per_window: usize,
}

impl RateLimiter {
    /// Limiter allowing `max_per_second` sends per sender in any 1-second window
    pub fn per_second(max_per_second: usize) -> Self {
        Self::new(Duration::from_secs(1), max_per_second)
    }

    pub fn new(window: Duration, max_per_window: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_per_window,
        }
    }

    /// Check and record one send for `key`.
    ///
    /// Returns true if the send is allowed, false if the limit is exceeded.
    pub fn allow(&self, key: &str) -> bool {
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(SendWindow::new);
        window.try_record(Instant::now(), self.window, self.max_per_window)
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }

    /// Forget all senders
    pub fn reset(&self) {
        self.windows.clear();
    }
}
