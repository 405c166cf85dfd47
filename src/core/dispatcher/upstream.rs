//! Outbound provider calls
//!
//! One function owns the HTTP leg of an attempt: auth-header injection,
//! the POST itself, and classification of whatever comes back into the
//! three-way outcome taxonomy (success / transient / permanent).
//!
//! The request body ships unchanged apart from auth injection and the
//! provider's model identifier; response parsing extracts only the JSON
//! payload.

use crate::core::clock::Clock;
use crate::core::registry::ProviderSnapshot;
use crate::core::types::{AttemptOutcome, ErrorKind};
use std::time::Duration;
use tracing::debug;

/// Result of one completed outbound call.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub outcome: AttemptOutcome,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    /// Parsed response body on success.
    pub result: Option<serde_json::Value>,
    /// Human-readable failure detail for `last_error` and reporting.
    pub detail: String,
}

/// Merge the caller's payload with the provider's model identifier. The
/// payload is shipped as-is; only a missing `model` field is filled in.
pub fn prepare_body(payload: &serde_json::Value, model: &str) -> serde_json::Value {
    let mut body = payload.clone();
    if let Some(map) = body.as_object_mut() {
        map.entry("model")
            .or_insert_with(|| serde_json::Value::String(model.to_string()));
    }
    body
}

/// Execute one POST against the provider and classify the outcome.
pub async fn call(
    client: &reqwest::Client,
    provider: &ProviderSnapshot,
    secret: &str,
    body: &serde_json::Value,
    timeout: Duration,
    clock: &dyn Clock,
) -> AttemptResult {
    let started = clock.monotonic();
    let request = match &provider.auth_header {
        Some(header) => client.post(&provider.endpoint).header(header.as_str(), secret),
        None => client.post(&provider.endpoint).bearer_auth(secret),
    }
    .json(body)
    .send();

    let response = match tokio::time::timeout(timeout, request).await {
        Err(_) => {
            return AttemptResult {
                outcome: AttemptOutcome::Transient(ErrorKind::Timeout),
                http_status: None,
                latency_ms: elapsed_ms(clock, started),
                result: None,
                detail: format!("request timed out after {}s", timeout.as_secs()),
            };
        }
        Ok(Err(e)) => {
            let kind = if e.is_timeout() {
                ErrorKind::Timeout
            } else {
                ErrorKind::Network
            };
            return AttemptResult {
                outcome: AttemptOutcome::Transient(kind),
                http_status: None,
                latency_ms: elapsed_ms(clock, started),
                result: None,
                detail: format!("request failed: {}", e),
            };
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    let status_code = status.as_u16();

    if status.is_success() {
        return match response.json::<serde_json::Value>().await {
            Ok(value) => {
                let latency_ms = elapsed_ms(clock, started);
                debug!(provider = %provider.name, latency_ms, "upstream responded");
                AttemptResult {
                    outcome: AttemptOutcome::Success,
                    http_status: Some(status_code),
                    latency_ms,
                    result: Some(value),
                    detail: String::new(),
                }
            }
            Err(e) => AttemptResult {
                outcome: AttemptOutcome::Permanent(ErrorKind::MalformedResponse),
                http_status: Some(status_code),
                latency_ms: elapsed_ms(clock, started),
                result: None,
                detail: format!("unparseable response body: {}", e),
            },
        };
    }

    let body_text = response.text().await.unwrap_or_default();
    let latency_ms = elapsed_ms(clock, started);
    let (outcome, detail) = classify_http_error(status_code, &body_text);

    AttemptResult {
        outcome,
        http_status: Some(status_code),
        latency_ms,
        result: None,
        detail,
    }
}

/// Map a non-2xx status to the outcome taxonomy.
pub fn classify_http_error(status: u16, body: &str) -> (AttemptOutcome, String) {
    let snippet: String = body.chars().take(200).collect();
    match status {
        429 => (
            AttemptOutcome::Transient(ErrorKind::RateLimited),
            "upstream rate limit (429)".to_string(),
        ),
        500..=599 => (
            AttemptOutcome::Transient(ErrorKind::ServerError),
            format!("upstream error {}: {}", status, snippet),
        ),
        401 | 403 => (
            AttemptOutcome::Permanent(ErrorKind::CredentialRejected),
            format!("credential rejected ({})", status),
        ),
        _ => (
            AttemptOutcome::Permanent(ErrorKind::BadRequest),
            format!("upstream rejected request {}: {}", status, snippet),
        ),
    }
}

fn elapsed_ms(clock: &dyn Clock, started: Duration) -> u64 {
    clock
        .monotonic()
        .saturating_sub(started)
        .as_millis()
        .min(u128::from(u64::MAX)) as u64
}
