//! Provider Registry
//!
//! Owns the canonical in-memory view of all providers and mediates
//! concurrent access. Reads never block each other: every read copies the
//! record into a [`ProviderSnapshot`] under that record's own mutex.
//! Writes are serialized per provider, never globally.
//!
//! Mutations fan out to subscribers over bounded channels; a slow
//! subscriber loses events rather than blocking the writer.

pub mod record;

pub use record::{CounterDelta, ProviderRecord, ProviderSnapshot, Window};

use crate::config::ProviderSeed;
use crate::core::clock::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What changed in a registry mutation, delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Registered,
    CountersUpdated,
    WindowReset,
    EnabledChanged,
    CooldownChanged,
    CredentialChanged,
    ErrorRecorded,
    ConfigApplied,
    PrimaryChanged,
}

/// Notification emitted after each registry mutation.
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub provider: String,
    pub change: ChangeKind,
}

/// The authoritative provider table.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<Mutex<ProviderRecord>>>,
    subscribers: Mutex<Vec<mpsc::Sender<RegistryEvent>>>,
    clock: Arc<dyn Clock>,
}

impl ProviderRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            providers: DashMap::new(),
            subscribers: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Insert or replace a provider record.
    pub fn register(&self, record: ProviderRecord) {
        let name = record.name.clone();
        info!(provider = %name, "registering provider");
        self.providers
            .insert(name.clone(), Arc::new(Mutex::new(record)));
        self.notify(name, ChangeKind::Registered);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Consistent snapshot of all providers, sorted by name.
    pub fn list(&self) -> Vec<ProviderSnapshot> {
        let now = self.clock.now();
        let mut out: Vec<ProviderSnapshot> = self
            .providers
            .iter()
            .map(|entry| entry.value().lock().snapshot(now))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Snapshot of one provider.
    pub fn get(&self, name: &str) -> Option<ProviderSnapshot> {
        let now = self.clock.now();
        self.providers
            .get(name)
            .map(|entry| entry.value().lock().snapshot(now))
    }

    /// Atomically apply a bounded arithmetic mutation and refresh
    /// `last_used_at`.
    pub fn update_counters(&self, name: &str, delta: CounterDelta) -> bool {
        let now = self.clock.now();
        self.mutate(name, ChangeKind::CountersUpdated, |record| {
            record.success_count += u64::from(delta.successes);
            record.error_count += u64::from(delta.errors);
            record.total_latency_ms += delta.latency_ms;
            record.minute_usage += delta.minute_usage;
            record.day_usage += delta.day_usage;
            record.last_used_at = Some(now);
        })
        .is_some()
    }

    /// Zero one window's counter and restart it at `at`.
    pub fn reset_window(&self, name: &str, window: Window, at: DateTime<Utc>) -> bool {
        self.mutate(name, ChangeKind::WindowReset, |record| match window {
            Window::Minute => {
                record.minute_usage = 0;
                record.minute_window_start = at;
            }
            Window::Day => {
                record.day_usage = 0;
                record.day_window_start = at;
            }
        })
        .is_some()
    }

    /// Set the operator toggle; returns the new state.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Option<bool> {
        self.mutate(name, ChangeKind::EnabledChanged, |record| {
            record.enabled = enabled;
            record.enabled
        })
    }

    /// Flip the operator toggle; returns the new state.
    pub fn toggle_enabled(&self, name: &str) -> Option<bool> {
        self.mutate(name, ChangeKind::EnabledChanged, |record| {
            record.enabled = !record.enabled;
            record.enabled
        })
    }

    pub fn set_cooldown(&self, name: &str, until: Option<DateTime<Utc>>) -> bool {
        self.mutate(name, ChangeKind::CooldownChanged, |record| {
            record.cooldown_until = until;
        })
        .is_some()
    }

    pub fn set_last_error(&self, name: &str, text: &str) -> bool {
        let now = self.clock.now();
        self.mutate(name, ChangeKind::ErrorRecorded, |record| {
            record.last_error = Some(text.to_string());
            record.last_error_at = Some(now);
        })
        .is_some()
    }

    pub fn set_credential_valid(&self, name: &str, valid: bool) -> bool {
        self.mutate(name, ChangeKind::CredentialChanged, |record| {
            record.has_valid_credential = valid;
        })
        .is_some()
    }

    /// Bump the consecutive-transient-failure counter; returns the new
    /// count.
    pub fn bump_transient_strikes(&self, name: &str) -> Option<u32> {
        self.mutate(name, ChangeKind::ErrorRecorded, |record| {
            record.transient_strikes += 1;
            record.transient_strikes
        })
    }

    /// Reset the strike counter after a successful attempt.
    pub fn clear_transient_strikes(&self, name: &str) -> bool {
        self.mutate(name, ChangeKind::CountersUpdated, |record| {
            record.transient_strikes = 0;
        })
        .is_some()
    }

    /// Designate `name` as the single primary provider. Returns the
    /// previous primary, if any. No-op returning `None` for unknown names.
    pub fn set_primary(&self, name: &str) -> Option<Option<String>> {
        if !self.providers.contains_key(name) {
            return None;
        }

        let mut previous = None;
        for entry in self.providers.iter() {
            let mut record = entry.value().lock();
            if record.is_primary && record.name != name {
                previous = Some(record.name.clone());
                record.is_primary = false;
            }
        }
        self.mutate(name, ChangeKind::PrimaryChanged, |record| {
            record.is_primary = true;
        });
        Some(previous)
    }

    /// Refresh static fields from a changed seed, preserving runtime
    /// counters. Returns false when the provider is unknown.
    pub fn apply_config(&self, seed: &ProviderSeed) -> bool {
        let name = seed.name.clone();
        self.mutate(&name, ChangeKind::ConfigApplied, |record| {
            record.apply_seed(seed);
        })
        .is_some()
    }

    /// Register a listener invoked after each mutation. The queue is
    /// bounded; events beyond `capacity` are dropped rather than blocking
    /// the mutating caller.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Run `f` under the named provider's lock, then notify subscribers.
    /// The lock is released before notification; no suspension ever
    /// happens while it is held.
    pub(crate) fn mutate<R>(
        &self,
        name: &str,
        change: ChangeKind,
        f: impl FnOnce(&mut ProviderRecord) -> R,
    ) -> Option<R> {
        let result = {
            let entry = self.providers.get(name)?;
            let mut record = entry.value().lock();
            f(&mut record)
        };
        self.notify(name.to_string(), change);
        Some(result)
    }

    fn notify(&self, provider: String, change: ChangeKind) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            match tx.try_send(RegistryEvent {
                provider: provider.clone(),
                change,
            }) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(provider = %provider, "subscriber queue full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}
