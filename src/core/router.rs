//! Router facade
//!
//! One constructed [`Router`] owns the whole subsystem: registry, rate
//! limiter, dispatcher, failover log, and the background mirror task.
//! There is no ambient global state — callers hold the instance and its
//! lifecycle is `init(config) → run → shutdown`.

use crate::config::{ProviderSeed, RouterConfig};
use crate::core::clock::Clock;
use crate::core::dispatcher::Dispatcher;
use crate::core::failover::FailoverLog;
use crate::core::rate_limiter::RateLimiter;
use crate::core::registry::{ProviderRecord, ProviderRegistry, ProviderSnapshot};
use crate::core::stores::{CredentialStore, StateStore, TelemetrySink};
use crate::core::types::{
    ControlRequest, DispatchContext, DispatchRequest, DispatchResponse, FailoverEvent,
    RequestAction, TestReport,
};
use crate::utils::error::{Result, RouterError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The assembled inference router.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    dispatcher: Dispatcher,
    failover: Arc<FailoverLog>,
    state_store: Arc<dyn StateStore>,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    failover_history_limit: usize,
    mirror_task: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Build a router: seed the registry from the state store, wire the
    /// components, and start the state mirror.
    pub async fn init(
        config: &RouterConfig,
        credentials: Arc<dyn CredentialStore>,
        state_store: Arc<dyn StateStore>,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::new(clock.clone()));

        let seeds = state_store
            .load_providers()
            .await
            .map_err(RouterError::Store)?;
        let now = clock.now();
        let mut registered = 0usize;
        for seed in &seeds {
            if let Err(e) = url::Url::parse(&seed.endpoint) {
                warn!(provider = %seed.name, error = %e, "invalid endpoint, provider skipped");
                continue;
            }
            let credential_present = credentials.get_credential(&seed.credential_ref).await.is_some();
            registry.register(ProviderRecord::from_seed(seed, now, credential_present));
            registered += 1;
        }
        info!(providers = registered, "registry seeded");

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RouterError::Configuration(format!("http client: {}", e)))?;

        let limiter = RateLimiter::new(registry.clone(), clock.clone());
        let failover = Arc::new(FailoverLog::new());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            limiter,
            failover.clone(),
            credentials.clone(),
            telemetry,
            clock.clone(),
            http,
            config.dispatch.dispatcher_config(),
        );

        let router = Self {
            registry,
            dispatcher,
            failover,
            state_store,
            credentials,
            clock,
            failover_history_limit: config.dispatch.failover_history_limit,
            mirror_task: Mutex::new(None),
        };
        router.spawn_mirror(config.dispatch.mirror_queue_capacity);
        Ok(router)
    }

    /// Execute an analyze request with default context.
    pub async fn analyze(&self, payload: serde_json::Value) -> Result<DispatchResponse> {
        let request = DispatchRequest::analyze(payload, self.clock.now());
        self.dispatch(&request, &DispatchContext::default()).await
    }

    /// Execute a request under an explicit deadline/cancellation context.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        ctx: &DispatchContext,
    ) -> Result<DispatchResponse> {
        self.dispatcher.dispatch(request, ctx).await
    }

    pub async fn test_provider(&self, name: &str) -> Result<TestReport> {
        self.dispatcher.test_provider(name).await
    }

    /// Flip or set the operator toggle; returns the new enabled state.
    pub fn toggle_provider(&self, name: &str, desired: Option<bool>) -> Result<bool> {
        self.dispatcher.toggle_provider(name, desired)
    }

    pub fn list_providers(&self) -> Vec<ProviderSnapshot> {
        self.dispatcher.list_providers()
    }

    /// Most-recent-first failover rows, capped.
    pub fn failover_history(&self, limit: Option<usize>) -> Vec<FailoverEvent> {
        self.failover
            .recent(limit.unwrap_or(self.failover_history_limit))
    }

    /// Operator path: designate a new primary and record the manual
    /// switch when the designation actually moved.
    pub fn set_primary(&self, name: &str) -> Result<()> {
        let previous = self
            .registry
            .set_primary(name)
            .ok_or_else(|| RouterError::NoProviderAvailable(format!("unknown provider '{}'", name)))?;

        if let Some(previous) = previous {
            self.failover.record_manual(&previous, name, self.clock.now());
        }
        Ok(())
    }

    /// Apply an out-of-band `provider_config_changed` notification:
    /// refresh static fields for known providers, register new ones.
    pub async fn apply_provider_config(&self, seed: &ProviderSeed) {
        if self.registry.apply_config(seed) {
            return;
        }
        let credential_present = self.credentials.get_credential(&seed.credential_ref).await.is_some();
        self.registry
            .register(ProviderRecord::from_seed(seed, self.clock.now(), credential_present));
    }

    /// Serve one typed control message. This is the transport-agnostic
    /// surface; the HTTP server is a thin adapter over it.
    pub async fn handle(&self, msg: ControlRequest) -> Result<serde_json::Value> {
        match msg {
            ControlRequest::Dispatch { action, payload } => match action {
                RequestAction::Analyze => {
                    let response = self.analyze(payload).await?;
                    Ok(serde_json::to_value(response).expect("response serializes"))
                }
                other => Err(RouterError::InvalidRequest(format!(
                    "action {:?} has a dedicated message",
                    other
                ))),
            },
            ControlRequest::ListProviders {} => {
                Ok(serde_json::to_value(self.list_providers()).expect("snapshots serialize"))
            }
            ControlRequest::TestProvider { name } => {
                let report = self.test_provider(&name).await?;
                Ok(serde_json::to_value(report).expect("report serializes"))
            }
            ControlRequest::ToggleProvider { name } => {
                let enabled = self.toggle_provider(&name, None)?;
                Ok(serde_json::json!({ "enabled": enabled }))
            }
            ControlRequest::GetFailoverHistory { limit } => {
                Ok(serde_json::to_value(self.failover_history(limit)).expect("events serialize"))
            }
        }
    }

    /// Stop background work. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(task) = self.mirror_task.lock().take() {
            task.abort();
            info!("state mirror stopped");
        }
    }

    /// Mirror registry mutations and failover rows to the external state
    /// store, best-effort. Counter writes go out at most once per second
    /// per provider: the first change mirrors immediately, changes inside
    /// the window coalesce and flush on the next tick. Queue overflow
    /// drops events instead of blocking writers.
    fn spawn_mirror(&self, queue_capacity: usize) {
        let mut registry_events = self.registry.subscribe(queue_capacity);
        let mut failover_events = self.failover.watch(queue_capacity);
        let registry = self.registry.clone();
        let store = self.state_store.clone();
        let clock = self.clock.clone();

        let task = tokio::spawn(async move {
            let mut last_mirrored: HashMap<String, DateTime<Utc>> = HashMap::new();
            let mut pending: HashSet<String> = HashSet::new();
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        for provider in std::mem::take(&mut pending) {
                            mirror_counters(&registry, &store, &provider, clock.now(), &mut last_mirrored).await;
                        }
                    }
                    event = registry_events.recv() => {
                        let Some(event) = event else { break };
                        let now = clock.now();
                        let due = last_mirrored
                            .get(&event.provider)
                            .map_or(true, |at| now - *at >= chrono::Duration::seconds(1));
                        if due {
                            mirror_counters(&registry, &store, &event.provider, now, &mut last_mirrored).await;
                        } else {
                            pending.insert(event.provider);
                        }
                    }
                    event = failover_events.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = store.persist_failover(&event).await {
                            warn!(error = %e, "failover mirror failed");
                        }
                    }
                }
            }
        });
        *self.mirror_task.lock() = Some(task);
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(task) = self.mirror_task.lock().take() {
            task.abort();
        }
    }
}

/// Best-effort single-provider counter mirror.
async fn mirror_counters(
    registry: &Arc<ProviderRegistry>,
    store: &Arc<dyn StateStore>,
    provider: &str,
    now: DateTime<Utc>,
    last_mirrored: &mut HashMap<String, DateTime<Utc>>,
) {
    let Some(snapshot) = registry.get(provider) else {
        return;
    };
    match store.persist_counters(&snapshot).await {
        Ok(()) => {
            last_mirrored.insert(provider.to_string(), now);
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "counter mirror failed");
        }
    }
}
