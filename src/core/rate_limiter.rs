//! Per-provider dual-window rate limiter
//!
//! Gates attempts against two independent windows per provider:
//! requests-per-minute and requests-per-day. Windows are
//! sliding-on-reset: an expired window restarts at `now`, not at
//! `window_start + period`, trading drift for burst-safety at window
//! boundaries.
//!
//! `try_acquire` is atomic per provider — the window check, any reset,
//! and the counter increments happen under that provider's record lock,
//! so two concurrent grants are both counted and the cap is enforced
//! exactly.

use crate::core::clock::Clock;
use crate::core::registry::{ChangeKind, ProviderRegistry};
use std::sync::Arc;
use tracing::debug;

/// Why an acquisition was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    RpmExhausted,
    RpdExhausted,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RpmExhausted => f.write_str("rpm_exhausted"),
            Self::RpdExhausted => f.write_str("rpd_exhausted"),
        }
    }
}

/// Outcome of [`RateLimiter::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Denied(DenyReason),
}

/// Dual-window limiter over registry records.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    registry: Arc<ProviderRegistry>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(registry: Arc<ProviderRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Attempt to reserve one request slot against both windows.
    ///
    /// Returns `None` for an unknown provider. On a grant both usage
    /// counters are incremented before the lock is released.
    pub fn try_acquire(&self, provider: &str) -> Option<Acquire> {
        let now = self.clock.now();

        let outcome = self
            .registry
            .mutate(provider, ChangeKind::CountersUpdated, |record| {
                use crate::core::registry::Window;

                if now - record.minute_window_start >= Window::Minute.period() {
                    record.minute_usage = 0;
                    record.minute_window_start = now;
                }
                if now - record.day_window_start >= Window::Day.period() {
                    record.day_usage = 0;
                    record.day_window_start = now;
                }

                if record.minute_usage >= record.rate_limit_rpm {
                    return Acquire::Denied(DenyReason::RpmExhausted);
                }
                if let Some(cap) = record.rate_limit_rpd {
                    if record.day_usage >= cap {
                        return Acquire::Denied(DenyReason::RpdExhausted);
                    }
                }

                record.minute_usage += 1;
                record.day_usage += 1;
                Acquire::Granted
            })?;

        if let Acquire::Denied(reason) = outcome {
            debug!(provider = %provider, %reason, "rate limit denied");
        }
        Some(outcome)
    }
}
