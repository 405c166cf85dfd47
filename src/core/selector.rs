//! Candidate selection
//!
//! A pure function over a registry snapshot and request attributes: the
//! same snapshot and request always produce the same ordered list. The
//! Selector filters on availability (enabled, credentialed, out of
//! cooldown) and sorts; rate windows are deliberately left to
//! `try_acquire` at dispatch time, so a provider sitting at its cap is
//! still listed, denied locally, and recorded as a `rate_limited`
//! failover when the next candidate takes over.
//!
//! Ordering: priority ascending, then empirical success rate descending
//! (providers with zero completed attempts get a neutral 0.5), then
//! average latency ascending, then name ascending for determinism.

use crate::core::registry::ProviderSnapshot;
use crate::core::types::{DispatchRequest, ProviderStatus};
use std::cmp::Ordering;

/// Produce the ordered candidate list for one request.
///
/// An explicit `pinned_provider` short-circuits the policy: the result is
/// `[name]` when that provider is available, empty otherwise. An empty
/// list signals "no provider available".
pub fn candidates(snapshot: &[ProviderSnapshot], request: &DispatchRequest) -> Vec<String> {
    if let Some(pinned) = &request.pinned_provider {
        return snapshot
            .iter()
            .filter(|p| &p.name == pinned && p.status == ProviderStatus::Ready)
            .map(|p| p.name.clone())
            .collect();
    }

    let mut available: Vec<&ProviderSnapshot> = snapshot
        .iter()
        .filter(|p| p.status == ProviderStatus::Ready)
        .collect();
    available.sort_by(|a, b| compare(a, b));

    let mut names: Vec<String> = available.into_iter().map(|p| p.name.clone()).collect();
    if let Some(cap) = request.max_attempts {
        names.truncate(cap);
    }
    names
}

fn compare(a: &ProviderSnapshot, b: &ProviderSnapshot) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.success_rate.total_cmp(&a.success_rate))
        .then_with(|| a.avg_latency_ms.total_cmp(&b.avg_latency_ms))
        .then_with(|| a.name.cmp(&b.name))
}
