//! Fixed request window used by the admission queue.

use std::time::Duration;

use tokio::time::Instant;

/// One fixed admission window.
///
/// `request_count <= limit` holds while the window is open. A window is never
/// reset in place: once it expires it is replaced by [`RateWindow::rolled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// When this window opened.
    pub window_start: Instant,
    /// Requests admitted so far in this window.
    pub request_count: u32,
    /// Maximum requests admitted per window.
    pub limit: u32,
    /// Window length.
    pub duration: Duration,
}

impl RateWindow {
    /// Open a fresh window at `now`.
    #[must_use]
    pub const fn open(now: Instant, limit: u32, duration: Duration) -> Self {
        Self {
            window_start: now,
            request_count: 0,
            limit,
            duration,
        }
    }

    /// Whether the window has run its full duration.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.duration
    }

    /// The window that replaces this one at `now`.
    #[must_use]
    pub const fn rolled(&self, now: Instant) -> Self {
        Self::open(now, self.limit, self.duration)
    }

    /// Whether another request fits in this window.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.request_count < self.limit
    }

    /// Count one admitted request. Returns `false`, and counts nothing, if the
    /// window is full.
    #[must_use = "a refused slot must not be dispatched"]
    pub fn record_dispatch(&mut self) -> bool {
        if !self.has_capacity() {
            return false;
        }
        self.request_count += 1;
        true
    }

    /// Time left until this window expires.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }
}
