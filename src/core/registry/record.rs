//! Provider record and snapshot types
//!
//! A [`ProviderRecord`] is the canonical mutable row for one upstream
//! provider: static configuration plus runtime counters and windows.
//! Consumers never see the record itself — they get a [`ProviderSnapshot`]
//! copy with the derived reporting fields computed at read time.

use crate::config::ProviderSeed;
use crate::core::types::ProviderStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds in the per-minute rate window.
pub const MINUTE_WINDOW_SECS: i64 = 60;
/// Seconds in the per-day rate window.
pub const DAY_WINDOW_SECS: i64 = 86_400;

/// Which rate window an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Minute,
    Day,
}

impl Window {
    pub fn period(self) -> Duration {
        match self {
            Window::Minute => Duration::seconds(MINUTE_WINDOW_SECS),
            Window::Day => Duration::seconds(DAY_WINDOW_SECS),
        }
    }
}

/// Canonical in-memory row for one provider.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    // Static configuration
    pub name: String,
    pub display_name: String,
    pub model: String,
    pub endpoint: String,
    /// Opaque handle resolved through the credential store; the Router
    /// never holds the plaintext secret.
    pub credential_ref: String,
    /// Header used for auth injection; `None` means `Authorization: Bearer`.
    pub auth_header: Option<String>,
    /// Lower is tried first; ties broken downstream.
    pub priority: i32,
    pub rate_limit_rpm: u32,
    /// `None` is the unlimited sentinel.
    pub rate_limit_rpd: Option<u32>,
    pub timeout_secs: u64,

    // Runtime state
    pub enabled: bool,
    pub has_valid_credential: bool,
    pub is_primary: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub total_latency_ms: u64,
    pub minute_usage: u32,
    pub day_usage: u32,
    pub minute_window_start: DateTime<Utc>,
    pub day_window_start: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Consecutive transient failures; drives exponential cooldown and
    /// resets on success.
    pub transient_strikes: u32,
}

impl ProviderRecord {
    /// Build a fresh record from static configuration.
    pub fn from_seed(seed: &ProviderSeed, now: DateTime<Utc>, credential_present: bool) -> Self {
        Self {
            name: seed.name.clone(),
            display_name: seed
                .display_name
                .clone()
                .unwrap_or_else(|| seed.name.clone()),
            model: seed.model.clone(),
            endpoint: seed.endpoint.clone(),
            credential_ref: seed.credential_ref.clone(),
            auth_header: seed.auth_header.clone(),
            priority: seed.priority,
            rate_limit_rpm: seed.rate_limit_rpm,
            rate_limit_rpd: seed.rate_limit_rpd,
            timeout_secs: seed.timeout_secs,
            enabled: seed.enabled,
            has_valid_credential: credential_present,
            is_primary: false,
            success_count: 0,
            error_count: 0,
            total_latency_ms: 0,
            minute_usage: 0,
            day_usage: 0,
            minute_window_start: now,
            day_window_start: now,
            last_used_at: None,
            last_error: None,
            last_error_at: None,
            cooldown_until: None,
            transient_strikes: 0,
        }
    }

    /// Refresh static fields from a changed seed without touching runtime
    /// counters. Used on `provider_config_changed` notifications.
    pub fn apply_seed(&mut self, seed: &ProviderSeed) {
        self.display_name = seed
            .display_name
            .clone()
            .unwrap_or_else(|| seed.name.clone());
        self.model = seed.model.clone();
        self.endpoint = seed.endpoint.clone();
        self.credential_ref = seed.credential_ref.clone();
        self.auth_header = seed.auth_header.clone();
        self.priority = seed.priority;
        self.rate_limit_rpm = seed.rate_limit_rpm;
        self.rate_limit_rpd = seed.rate_limit_rpd;
        self.timeout_secs = seed.timeout_secs;
        self.enabled = seed.enabled;
    }

    /// Usage that counts against the minute cap as of `now`. A window
    /// whose period has elapsed counts as empty even before the limiter
    /// physically resets it.
    pub fn effective_minute_usage(&self, now: DateTime<Utc>) -> u32 {
        if now - self.minute_window_start >= Window::Minute.period() {
            0
        } else {
            self.minute_usage
        }
    }

    /// Usage that counts against the day cap as of `now`.
    pub fn effective_day_usage(&self, now: DateTime<Utc>) -> u32 {
        if now - self.day_window_start >= Window::Day.period() {
            0
        } else {
            self.day_usage
        }
    }

    /// Whether the cooldown gate passes as of `now`.
    pub fn cooldown_passed(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }

    /// Derived state machine position as of `now`.
    pub fn status(&self, now: DateTime<Utc>) -> ProviderStatus {
        if !self.enabled {
            ProviderStatus::Disabled
        } else if !self.has_valid_credential {
            ProviderStatus::InvalidCredential
        } else if !self.cooldown_passed(now) {
            ProviderStatus::Cooling
        } else {
            ProviderStatus::Ready
        }
    }

    /// The eligibility predicate: enabled, credentialed, out of cooldown,
    /// and under both rate windows.
    pub fn eligible(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.has_valid_credential
            && self.cooldown_passed(now)
            && self.effective_minute_usage(now) < self.rate_limit_rpm
            && self
                .rate_limit_rpd
                .map_or(true, |cap| self.effective_day_usage(now) < cap)
    }

    /// Empirical success rate; providers with no completed attempts get a
    /// neutral 0.5 so new entries are not starved.
    pub fn success_rate(&self) -> f64 {
        let attempts = self.success_count + self.error_count;
        if attempts == 0 {
            0.5
        } else {
            self.success_count as f64 / attempts as f64
        }
    }

    /// Average latency over successful attempts.
    pub fn avg_latency_ms(&self) -> f64 {
        self.total_latency_ms as f64 / self.success_count.max(1) as f64
    }

    /// Copy-on-read view with derived fields, computed as of `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> ProviderSnapshot {
        let minute_usage = self.effective_minute_usage(now);
        let day_usage = self.effective_day_usage(now);
        let at_rate_limit = minute_usage >= self.rate_limit_rpm
            || self.rate_limit_rpd.is_some_and(|cap| day_usage >= cap);

        ProviderSnapshot {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            credential_ref: self.credential_ref.clone(),
            auth_header: self.auth_header.clone(),
            priority: self.priority,
            rate_limit_rpm: self.rate_limit_rpm,
            rate_limit_rpd: self.rate_limit_rpd,
            timeout_secs: self.timeout_secs,
            enabled: self.enabled,
            has_valid_key: self.has_valid_credential,
            is_primary: self.is_primary,
            success_count: self.success_count,
            error_count: self.error_count,
            total_latency_ms: self.total_latency_ms,
            minute_usage,
            day_usage,
            at_rate_limit,
            success_rate: self.success_rate(),
            avg_latency_ms: self.avg_latency_ms(),
            status: self.status(now),
            eligible: self.eligible(now),
            last_used_at: self.last_used_at,
            last_error: self.last_error.clone(),
            last_error_at: self.last_error_at,
            cooldown_until: self.cooldown_until,
        }
    }
}

/// Read-only provider view with derived reporting fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub name: String,
    pub display_name: String,
    pub model: String,
    pub endpoint: String,
    /// Opaque credential handle; needed by the dispatcher, never exposed
    /// over the control surface.
    #[serde(skip_serializing, default)]
    pub credential_ref: String,
    #[serde(skip_serializing, default)]
    pub auth_header: Option<String>,
    pub priority: i32,
    pub rate_limit_rpm: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_rpd: Option<u32>,
    pub timeout_secs: u64,
    pub enabled: bool,
    pub has_valid_key: bool,
    pub is_primary: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub total_latency_ms: u64,
    pub minute_usage: u32,
    pub day_usage: u32,
    pub at_rate_limit: bool,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub status: ProviderStatus,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Bounded arithmetic mutation applied atomically by the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDelta {
    pub successes: u32,
    pub errors: u32,
    pub latency_ms: u64,
    pub minute_usage: u32,
    pub day_usage: u32,
}

impl CounterDelta {
    /// Delta for one successful attempt.
    pub fn success(latency_ms: u64) -> Self {
        Self {
            successes: 1,
            latency_ms,
            ..Self::default()
        }
    }

    /// Delta for one failed attempt.
    pub fn error() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }
}
