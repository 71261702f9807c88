//! Liveness bookkeeping for registered nodes.
//!
//! There is no background reaper. A node is stale once
//! `now - last_heartbeat_at > timeout`, and stale nodes are purged at the
//! start of the next selection call. Time comes from a [`Clock`] so tests
//! can move it forward without sleeping.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source for heartbeat timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// True if a node last heard from at `last_heartbeat_at` has exceeded
/// `timeout` as of `now`. Exactly `timeout` of silence is still alive.
pub fn is_stale(last_heartbeat_at: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last_heartbeat_at) > timeout
}

// ── Tests ─────────────────────────────────────────────────────────────────────
