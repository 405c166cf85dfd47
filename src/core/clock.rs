//! Time source abstraction
//!
//! Every component that needs time depends on [`Clock`] rather than
//! calling `Utc::now()` directly, so tests can substitute a deterministic
//! implementation. All wall-clock handling is UTC.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of wall and monotonic time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock instant (UTC).
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic duration since an arbitrary fixed origin. Suitable for
    /// latency measurement; never goes backwards.
    fn monotonic(&self) -> Duration;
}

/// Production clock backed by the operating system.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Deterministic clock for tests.
///
/// Both wall and monotonic time advance only through [`ManualClock::advance`].
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    elapsed: Duration,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                now,
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Advance both wall and monotonic time.
    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock();
        state.now += chrono::Duration::from_std(by).expect("advance out of range");
        state.elapsed += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().now
    }

    fn monotonic(&self) -> Duration {
        self.inner.lock().elapsed
    }
}
