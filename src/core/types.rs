//! Boundary types shared across Router components
//!
//! Inbound control messages, attempt classification, failover events and
//! the provider state machine live here. Everything is serde-serializable
//! so the control surface can run over any JSON-capable transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Classification of a single failed outbound attempt.
///
/// Drives cooldown and failover decisions; see the error taxonomy in the
/// dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream returned 429.
    RateLimited,
    /// Upstream returned 5xx.
    ServerError,
    /// The attempt exceeded its per-provider timeout.
    Timeout,
    /// Connection failure, reset, or other transport error.
    Network,
    /// Upstream rejected the credential (401/403).
    CredentialRejected,
    /// The credential store had no secret for the provider's reference.
    MissingCredential,
    /// Upstream returned a non-429 4xx.
    BadRequest,
    /// 2xx with a body that could not be parsed.
    MalformedResponse,
}

impl ErrorKind {
    /// Whether this kind is transient (cool down and fail over) or
    /// permanent (fail over without cooldown).
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Timeout | Self::Network
        )
    }

    /// Whether this kind invalidates the provider's credential.
    pub fn invalidates_credential(self) -> bool {
        matches!(self, Self::CredentialRejected | Self::MissingCredential)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::CredentialRejected => "credential_rejected",
            Self::MissingCredential => "missing_credential",
            Self::BadRequest => "bad_request",
            Self::MalformedResponse => "malformed_response",
        };
        f.write_str(s)
    }
}

/// Outcome of one completed outbound attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Transient(ErrorKind),
    Permanent(ErrorKind),
}

/// Record of one outbound call, kept for the duration of a dispatch.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub provider_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
    pub http_status: Option<u16>,
}

/// Per-candidate failure surfaced inside `AllProvidersExhausted` /
/// `DeadlineExceeded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptError {
    pub provider: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub message: String,
}

/// Why a failover transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverReason {
    HealthCheckFailure,
    LatencyThresholdExceeded,
    RateLimited,
    Manual,
}

impl FailoverReason {
    /// Map an attempt failure kind to the reason recorded for the
    /// transition away from that provider.
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Timeout => Self::LatencyThresholdExceeded,
            _ => Self::HealthCheckFailure,
        }
    }
}

/// Persisted record of a transition between two providers.
///
/// Rows are append-only and never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub from_provider: String,
    pub to_provider: String,
    pub reason: FailoverReason,
    pub is_automatic: bool,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Derived provider state, computed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Eligible for selection.
    Ready,
    /// Temporarily ineligible until `cooldown_until`.
    Cooling,
    /// Operator toggled off.
    Disabled,
    /// Last credential validation failed; a successful test restores it.
    InvalidCredential,
}

/// What a dispatch is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestAction {
    Analyze,
    TestProvider,
    GetProviders,
    Toggle,
}

/// One inbound inference request, ephemeral.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub request_id: Uuid,
    pub action: RequestAction,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    /// Caps candidate iteration; defaults to the number of eligible
    /// providers at selection time.
    pub max_attempts: Option<usize>,
    /// When set, the Selector returns only this provider (or nothing).
    pub pinned_provider: Option<String>,
}

impl DispatchRequest {
    /// Build an analyze request over the given payload.
    pub fn analyze(payload: serde_json::Value, received_at: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            action: RequestAction::Analyze,
            payload,
            received_at,
            max_attempts: None,
            pinned_provider: None,
        }
    }

    /// Build a single-provider test request.
    pub fn test(provider: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            action: RequestAction::TestProvider,
            payload: minimal_probe_payload(),
            received_at,
            max_attempts: Some(1),
            pinned_provider: Some(provider.to_string()),
        }
    }
}

/// Minimal body used by `test_provider` to verify credential and
/// round-trip without burning tokens.
pub fn minimal_probe_payload() -> serde_json::Value {
    serde_json::json!({
        "messages": [{ "role": "user", "content": "ping" }],
        "max_tokens": 1,
    })
}

/// Successful dispatch result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub provider_used: String,
    pub latency_ms: u64,
    pub result: serde_json::Value,
}

/// Result of `test_provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cooperative cancellation flag, checked at attempt boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-dispatch execution context: deadline and cancellation.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// Absolute wall-clock deadline for the whole dispatch.
    pub deadline: Option<DateTime<Utc>>,
    pub cancel: CancelFlag,
}

impl DispatchContext {
    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancelFlag::new(),
        }
    }
}

/// Typed inbound control messages (§ control surface). Representable as
/// JSON over any transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Dispatch {
        action: RequestAction,
        payload: serde_json::Value,
    },
    ListProviders {},
    TestProvider {
        name: String,
    },
    ToggleProvider {
        name: String,
    },
    GetFailoverHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
}
