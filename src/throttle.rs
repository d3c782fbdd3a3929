//! Scan-start throttling.
//!
//! Mobile and desktop Bluetooth stacks penalise clients that restart
//! discovery too often. [`StartThrottle`] keeps a sliding window of recent
//! start instants and refuses a new start once the window is full.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window limiter for scan starts.
///
/// At most `max_starts` starts are permitted within any trailing `window`.
/// Entries whose age has reached `window` are pruned before each check.
#[derive(Debug, Clone)]
pub struct StartThrottle {
    max_starts: usize,
    window: Duration,
    /// Recorded start instants, oldest first
    starts: VecDeque<Instant>,
}

impl StartThrottle {
    /// Create a throttle allowing `max_starts` starts per `window`.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use beacon_telemetry::throttle::StartThrottle;
    ///
    /// let throttle = StartThrottle::new(4, Duration::from_secs(30));
    /// assert_eq!(throttle.recorded(), 0);
    /// ```
    pub fn new(max_starts: usize, window: Duration) -> Self {
        StartThrottle {
            max_starts,
            window,
            starts: VecDeque::with_capacity(max_starts),
        }
    }

    /// Record a start at `now` if the window has room.
    ///
    /// Returns `true` if the start is permitted (and has been recorded),
    /// `false` if the caller must skip this attempt. A denied attempt leaves
    /// the window unchanged.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.starts.len() >= self.max_starts {
            return false;
        }
        self.starts.push_back(now);
        true
    }

    /// How long until a start would be permitted, or `None` if one is
    /// permitted at `now`.
    pub fn retry_after_at(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);
        if self.starts.len() < self.max_starts {
            return None;
        }
        // Full window: the oldest entry has to age out first.
        self.starts
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
    }

    /// Number of starts currently inside the window (as of the last prune).
    pub fn recorded(&self) -> usize {
        self.starts.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.starts.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }
}
