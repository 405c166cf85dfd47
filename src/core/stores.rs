//! External collaborator seams
//!
//! The Router's outbound dependencies — credential resolution, the
//! optional state mirror, and telemetry — are traits so deployments can
//! plug in their own backends. The implementations shipped here are the
//! ones the binary and the test suite use: environment-variable
//! credentials, an in-memory state store, and tracing-backed telemetry.

use crate::core::registry::ProviderSnapshot;
use crate::core::types::{ErrorKind, FailoverEvent, FailoverReason};
use crate::config::ProviderSeed;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, warn};

/// Resolves an opaque credential reference to a secret. Invoked once per
/// attempt; implementations may cache.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` means the reference has no secret (provider is treated as
    /// missing-credential).
    async fn get_credential(&self, reference: &str) -> Option<String>;
}

/// Credential store that reads the reference as an environment variable
/// name. Matches how provider keys reach the process in deployment
/// (`GROQ_API_KEY`, `OPENROUTER_API_KEY`, ...).
#[derive(Debug, Default)]
pub struct EnvCredentialStore;

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_credential(&self, reference: &str) -> Option<String> {
        std::env::var(reference)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Fixed-map credential store for tests and embedded use.
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    secrets: HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn with_secret(mut self, reference: &str, secret: &str) -> Self {
        self.secrets.insert(reference.to_string(), secret.to_string());
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get_credential(&self, reference: &str) -> Option<String> {
        self.secrets.get(reference).cloned()
    }
}

/// Optional external mirror of Router state. All writes are best-effort:
/// a failure is logged by the caller and never propagates.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Provider seeds loaded once at startup.
    async fn load_providers(&self) -> Result<Vec<ProviderSeed>, String>;

    /// Mirror one provider's counters. Throttled by the Router to at most
    /// once per second per provider.
    async fn persist_counters(&self, snapshot: &ProviderSnapshot) -> Result<(), String>;

    /// Mirror one failover event.
    async fn persist_failover(&self, event: &FailoverEvent) -> Result<(), String>;
}

/// State store holding everything in process memory. The authoritative
/// state always lives in the registry; this just makes the mirror path
/// observable in tests and lets the binary run without external storage.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    seeds: Mutex<Vec<ProviderSeed>>,
    counters: Mutex<HashMap<String, ProviderSnapshot>>,
    failovers: Mutex<Vec<FailoverEvent>>,
}

impl InMemoryStateStore {
    pub fn new(seeds: Vec<ProviderSeed>) -> Self {
        Self {
            seeds: Mutex::new(seeds),
            counters: Mutex::new(HashMap::new()),
            failovers: Mutex::new(Vec::new()),
        }
    }

    /// Counters mirrored so far, for inspection.
    pub fn mirrored_counters(&self) -> HashMap<String, ProviderSnapshot> {
        self.counters.lock().clone()
    }

    pub fn mirrored_failovers(&self) -> Vec<FailoverEvent> {
        self.failovers.lock().clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_providers(&self) -> Result<Vec<ProviderSeed>, String> {
        Ok(self.seeds.lock().clone())
    }

    async fn persist_counters(&self, snapshot: &ProviderSnapshot) -> Result<(), String> {
        self.counters
            .lock()
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }

    async fn persist_failover(&self, event: &FailoverEvent) -> Result<(), String> {
        self.failovers.lock().push(event.clone());
        Ok(())
    }
}

/// Telemetry events the Router emits on the hot path.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    AttemptSucceeded {
        provider: String,
        latency_ms: u64,
    },
    AttemptFailed {
        provider: String,
        kind: ErrorKind,
    },
    Failover {
        from: String,
        to: String,
        reason: FailoverReason,
    },
}

/// Sink for telemetry events. Must not block the dispatch path.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that emits structured log lines.
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::AttemptSucceeded {
                provider,
                latency_ms,
            } => info!(provider = %provider, latency_ms, "attempt succeeded"),
            TelemetryEvent::AttemptFailed { provider, kind } => {
                warn!(provider = %provider, kind = %kind, "attempt failed")
            }
            TelemetryEvent::Failover { from, to, reason } => {
                warn!(from = %from, to = %to, reason = ?reason, "failover")
            }
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Telemetry sink that collects events for assertions.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}
