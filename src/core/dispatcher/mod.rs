//! Request dispatch
//!
//! The Dispatcher executes a request end-to-end: it asks the Selector for
//! an ordered candidate list, then walks it — rate-limit gate, outbound
//! call, outcome classification, counter and cooldown updates — until one
//! call succeeds or the list is exhausted.
//!
//! Individual upstream failures never surface to the caller; a typed
//! error is returned only when no candidate exists, the whole list is
//! exhausted, the deadline elapses, or the caller cancels. Deadline and
//! cancellation are honored at attempt boundaries, never mid-HTTP.

pub mod upstream;

use crate::core::clock::Clock;
use crate::core::failover::FailoverLog;
use crate::core::rate_limiter::{Acquire, DenyReason, RateLimiter};
use crate::core::registry::{CounterDelta, ProviderRegistry, ProviderSnapshot};
use crate::core::selector;
use crate::core::stores::{CredentialStore, TelemetryEvent, TelemetrySink};
use crate::core::types::{
    Attempt, AttemptError, AttemptOutcome, DispatchContext, DispatchRequest, DispatchResponse,
    ErrorKind, FailoverReason, RequestAction, TestReport,
};
use crate::utils::error::{Result, RouterError};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Dispatch policy knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// First transient cooldown, doubled per consecutive strike.
    pub cooldown_base_secs: u64,
    /// Cooldown ceiling.
    pub cooldown_cap_secs: u64,
    /// Attempt timeout when the provider does not override it.
    pub default_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cooldown_base_secs: 30,
            cooldown_cap_secs: 900,
            default_timeout_secs: 30,
        }
    }
}

/// Executes requests against upstream providers.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    limiter: RateLimiter,
    failover: Arc<FailoverLog>,
    credentials: Arc<dyn CredentialStore>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    config: DispatcherConfig,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiter: RateLimiter,
        failover: Arc<FailoverLog>,
        credentials: Arc<dyn CredentialStore>,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            limiter,
            failover,
            credentials,
            telemetry,
            clock,
            http,
            config,
        }
    }

    /// Execute one request, failing over across candidates as needed.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        ctx: &DispatchContext,
    ) -> Result<DispatchResponse> {
        validate(request)?;

        let snapshot = self.registry.list();
        let names = selector::candidates(&snapshot, request);
        if names.is_empty() {
            let message = match &request.pinned_provider {
                Some(name) => format!("provider '{}' is unknown or ineligible", name),
                None => "no eligible provider".to_string(),
            };
            return Err(RouterError::NoProviderAvailable(message));
        }
        debug!(
            request_id = %request.request_id,
            candidates = ?names,
            "candidate list selected"
        );

        let mut attempts: Vec<AttemptError> = Vec::new();
        // Set whenever a candidate fails or is denied; consumed when the
        // next candidate is actually reached, producing one failover row
        // per transition between distinct candidates.
        let mut handoff: Option<(String, FailoverReason)> = None;

        for candidate in &names {
            if ctx.cancel.is_cancelled() {
                info!(request_id = %request.request_id, "dispatch cancelled by caller");
                return Err(RouterError::Cancelled);
            }
            if let Some(deadline) = ctx.deadline {
                if self.clock.now() >= deadline {
                    warn!(request_id = %request.request_id, "deadline elapsed, skipping remaining candidates");
                    return Err(RouterError::DeadlineExceeded { attempts });
                }
            }

            if let Some((from, reason)) = handoff.take() {
                self.record_failover(&from, candidate, reason);
            }

            match self.limiter.try_acquire(candidate) {
                None => {
                    // Provider vanished between snapshot and acquire.
                    debug!(provider = %candidate, "candidate no longer registered, skipping");
                    continue;
                }
                Some(Acquire::Denied(reason)) => {
                    attempts.push(AttemptError {
                        provider: candidate.clone(),
                        kind: ErrorKind::RateLimited,
                        http_status: None,
                        message: deny_message(reason),
                    });
                    handoff = Some((candidate.clone(), FailoverReason::RateLimited));
                    continue;
                }
                Some(Acquire::Granted) => {}
            }

            let Some(provider) = self.find(&snapshot, candidate) else {
                continue;
            };

            match self.attempt(request, ctx, &provider).await {
                AttemptVerdict::Succeeded(response) => return Ok(response),
                AttemptVerdict::Failed { err, reason } => {
                    attempts.push(err);
                    handoff = Some((candidate.clone(), reason));
                }
                AttemptVerdict::DeadlineHit => {
                    return Err(RouterError::DeadlineExceeded { attempts });
                }
            }
        }

        error!(
            request_id = %request.request_id,
            attempts = attempts.len(),
            "all providers exhausted"
        );
        Err(RouterError::AllProvidersExhausted { attempts })
    }

    /// Send a minimal payload to one provider to verify the credential
    /// and round-trip. A success restores credential validity and clears
    /// any cooldown; failures are classified exactly like dispatch
    /// attempts.
    pub async fn test_provider(&self, name: &str) -> Result<TestReport> {
        let provider = self
            .registry
            .get(name)
            .ok_or_else(|| RouterError::NoProviderAvailable(format!("unknown provider '{}'", name)))?;

        match self.limiter.try_acquire(name) {
            None => {
                return Err(RouterError::NoProviderAvailable(format!(
                    "unknown provider '{}'",
                    name
                )))
            }
            Some(Acquire::Denied(reason)) => {
                return Ok(TestReport {
                    ok: false,
                    latency_ms: None,
                    error: Some(deny_message(reason)),
                });
            }
            Some(Acquire::Granted) => {}
        }

        let Some(secret) = self.credentials.get_credential(&provider.credential_ref).await else {
            self.note_failure(name, ErrorKind::MissingCredential, "credential missing");
            return Ok(TestReport {
                ok: false,
                latency_ms: None,
                error: Some("credential missing".to_string()),
            });
        };

        let body = upstream::prepare_body(&crate::core::types::minimal_probe_payload(), &provider.model);
        let outcome = upstream::call(
            &self.http,
            &provider,
            &secret,
            &body,
            Duration::from_secs(self.timeout_secs(&provider)),
            self.clock.as_ref(),
        )
        .await;

        match outcome.outcome {
            AttemptOutcome::Success => {
                self.registry
                    .update_counters(name, CounterDelta::success(outcome.latency_ms));
                self.registry.clear_transient_strikes(name);
                self.registry.set_credential_valid(name, true);
                self.registry.set_cooldown(name, None);
                info!(provider = %name, latency_ms = outcome.latency_ms, "provider test passed");
                Ok(TestReport {
                    ok: true,
                    latency_ms: Some(outcome.latency_ms),
                    error: None,
                })
            }
            AttemptOutcome::Transient(kind) => {
                self.note_failure(name, kind, &outcome.detail);
                self.cool_down(name);
                Ok(TestReport {
                    ok: false,
                    latency_ms: Some(outcome.latency_ms),
                    error: Some(outcome.detail),
                })
            }
            AttemptOutcome::Permanent(kind) => {
                self.note_failure(name, kind, &outcome.detail);
                Ok(TestReport {
                    ok: false,
                    latency_ms: Some(outcome.latency_ms),
                    error: Some(outcome.detail),
                })
            }
        }
    }

    /// Set or flip the operator toggle; returns the new state.
    pub fn toggle_provider(&self, name: &str, desired: Option<bool>) -> Result<bool> {
        let new_state = match desired {
            Some(enabled) => self.registry.set_enabled(name, enabled),
            None => self.registry.toggle_enabled(name),
        };
        new_state.ok_or_else(|| {
            RouterError::NoProviderAvailable(format!("unknown provider '{}'", name))
        })
    }

    /// Snapshot array with derived fields, computed at read time.
    pub fn list_providers(&self) -> Vec<ProviderSnapshot> {
        self.registry.list()
    }

    async fn attempt(
        &self,
        request: &DispatchRequest,
        ctx: &DispatchContext,
        provider: &ProviderSnapshot,
    ) -> AttemptVerdict {
        let name = provider.name.as_str();

        let Some(secret) = self.credentials.get_credential(&provider.credential_ref).await else {
            self.note_failure(name, ErrorKind::MissingCredential, "credential missing");
            return AttemptVerdict::Failed {
                err: AttemptError {
                    provider: name.to_string(),
                    kind: ErrorKind::MissingCredential,
                    http_status: None,
                    message: "credential missing".to_string(),
                },
                reason: FailoverReason::HealthCheckFailure,
            };
        };

        let mut timeout = Duration::from_secs(self.timeout_secs(provider));
        if let Some(deadline) = ctx.deadline {
            let remaining = (deadline - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                return AttemptVerdict::DeadlineHit;
            }
            timeout = timeout.min(remaining);
        }

        let body = upstream::prepare_body(&request.payload, &provider.model);
        let started_at = self.clock.now();
        let outcome =
            upstream::call(&self.http, provider, &secret, &body, timeout, self.clock.as_ref())
                .await;

        let attempt = Attempt {
            provider_name: name.to_string(),
            started_at,
            finished_at: self.clock.now(),
            latency_ms: outcome.latency_ms,
            outcome: outcome.outcome,
            http_status: outcome.http_status,
        };
        debug!(
            request_id = %request.request_id,
            provider = %attempt.provider_name,
            outcome = ?attempt.outcome,
            latency_ms = attempt.latency_ms,
            "attempt completed"
        );

        match outcome.outcome {
            AttemptOutcome::Success => {
                self.registry
                    .update_counters(name, CounterDelta::success(outcome.latency_ms));
                self.registry.clear_transient_strikes(name);
                self.telemetry.record(TelemetryEvent::AttemptSucceeded {
                    provider: name.to_string(),
                    latency_ms: outcome.latency_ms,
                });
                AttemptVerdict::Succeeded(DispatchResponse {
                    provider_used: name.to_string(),
                    latency_ms: outcome.latency_ms,
                    result: outcome.result.unwrap_or(serde_json::Value::Null),
                })
            }
            AttemptOutcome::Transient(kind) => {
                self.note_failure(name, kind, &outcome.detail);
                self.cool_down(name);
                AttemptVerdict::Failed {
                    err: AttemptError {
                        provider: name.to_string(),
                        kind,
                        http_status: outcome.http_status,
                        message: outcome.detail,
                    },
                    reason: FailoverReason::from_error_kind(kind),
                }
            }
            AttemptOutcome::Permanent(kind) => {
                self.note_failure(name, kind, &outcome.detail);
                AttemptVerdict::Failed {
                    err: AttemptError {
                        provider: name.to_string(),
                        kind,
                        http_status: outcome.http_status,
                        message: outcome.detail,
                    },
                    reason: FailoverReason::from_error_kind(kind),
                }
            }
        }
    }

    /// Common bookkeeping for any failed attempt: error counter, last
    /// error text, credential invalidation when indicated.
    fn note_failure(&self, name: &str, kind: ErrorKind, detail: &str) {
        self.registry.update_counters(name, CounterDelta::error());
        self.registry.set_last_error(name, detail);
        if kind.invalidates_credential() {
            self.registry.set_credential_valid(name, false);
        }
        self.telemetry.record(TelemetryEvent::AttemptFailed {
            provider: name.to_string(),
            kind,
        });
    }

    fn cool_down(&self, name: &str) {
        if let Some(strikes) = self.registry.bump_transient_strikes(name) {
            let until = self.clock.now() + cooldown_backoff(&self.config, strikes);
            self.registry.set_cooldown(name, Some(until));
            debug!(provider = %name, strikes, until = %until, "provider cooling down");
        }
    }

    fn record_failover(&self, from: &str, to: &str, reason: FailoverReason) {
        self.failover
            .record_automatic(from, to, reason, self.clock.now());
        self.telemetry.record(TelemetryEvent::Failover {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        });
    }

    fn timeout_secs(&self, provider: &ProviderSnapshot) -> u64 {
        if provider.timeout_secs > 0 {
            provider.timeout_secs
        } else {
            self.config.default_timeout_secs
        }
    }

    fn find(&self, snapshot: &[ProviderSnapshot], name: &str) -> Option<ProviderSnapshot> {
        snapshot.iter().find(|p| p.name == name).cloned()
    }
}

enum AttemptVerdict {
    Succeeded(DispatchResponse),
    Failed {
        err: AttemptError,
        reason: FailoverReason,
    },
    /// The overall deadline left no time for this attempt.
    DeadlineHit,
}

fn validate(request: &DispatchRequest) -> Result<()> {
    match request.action {
        RequestAction::Analyze | RequestAction::TestProvider => {}
        other => {
            return Err(RouterError::InvalidRequest(format!(
                "action {:?} is not dispatchable",
                other
            )))
        }
    }
    if !request.payload.is_object() {
        return Err(RouterError::InvalidRequest(
            "payload must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

/// Exponential cooldown for the given consecutive-strike count:
/// base * 2^(strikes-1), capped.
fn cooldown_backoff(config: &DispatcherConfig, strikes: u32) -> ChronoDuration {
    let exp = strikes.saturating_sub(1).min(31);
    let secs = config
        .cooldown_base_secs
        .saturating_mul(1u64 << exp)
        .min(config.cooldown_cap_secs);
    ChronoDuration::seconds(secs as i64)
}

fn deny_message(reason: DenyReason) -> String {
    format!("rate limit exhausted ({})", reason)
}
