//! Error types for the Router
//!
//! `RouterError` is the only error type callers of the dispatch surface
//! ever see. Each variant carries a human-readable message via `Display`
//! and a machine-readable code via [`RouterError::code`].

use crate::core::types::AttemptError;
use thiserror::Error;

/// Result type alias for the Router
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors surfaced by the Router
#[derive(Error, Debug)]
pub enum RouterError {
    /// No eligible provider existed at selection time, or the caller named
    /// an unknown or ineligible provider.
    #[error("no provider available: {0}")]
    NoProviderAvailable(String),

    /// Every candidate was tried and failed; carries the per-candidate
    /// error kinds in attempt order.
    #[error("all providers exhausted after {} attempt(s)", attempts.len())]
    AllProvidersExhausted {
        /// One entry per completed attempt, in order.
        attempts: Vec<AttemptError>,
    },

    /// The overall deadline elapsed mid-iteration; remaining candidates
    /// were skipped. Carries the attempts completed before the cutoff.
    #[error("deadline exceeded after {} attempt(s)", attempts.len())]
    DeadlineExceeded {
        /// Attempts completed before the deadline elapsed.
        attempts: Vec<AttemptError>,
    },

    /// The caller aborted the request; iteration stopped at the next
    /// attempt boundary.
    #[error("request cancelled by caller")]
    Cancelled,

    /// Malformed or unsupported inbound request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// External state store failure (best-effort surfaces only).
    #[error("state store error: {0}")]
    Store(String),
}

impl RouterError {
    /// Machine-readable error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoProviderAvailable(_) => "no_provider_available",
            Self::AllProvidersExhausted { .. } => "all_providers_exhausted",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
            Self::Store(_) => "store",
        }
    }
}
