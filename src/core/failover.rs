//! Failover event log
//!
//! Append-only record of provider transitions. Writes are idempotent on
//! `(from, to, triggered_at)` truncated to the second, so a retried
//! mirror or a duplicated control message cannot double-log. Reads are
//! most-recent-first with a caller-supplied cap.
//!
//! The log is a reporting surface only: ranking derives from counters,
//! never from event history. Throughput is negligible, so a single
//! append lock suffices.

use crate::core::types::{FailoverEvent, FailoverReason};
use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// In-memory append-only failover log.
#[derive(Debug, Default)]
pub struct FailoverLog {
    inner: Mutex<LogState>,
    watchers: Mutex<Vec<mpsc::Sender<FailoverEvent>>>,
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<FailoverEvent>,
    seen: HashSet<(String, String, i64)>,
}

impl FailoverLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Returns false when an event with the same
    /// `(from, to, second)` key was already recorded.
    pub fn append(&self, event: FailoverEvent) -> bool {
        let key = (
            event.from_provider.clone(),
            event.to_provider.clone(),
            truncate_to_second(event.triggered_at),
        );

        {
            let mut state = self.inner.lock();
            if !state.seen.insert(key) {
                return false;
            }
            info!(
                from = %event.from_provider,
                to = %event.to_provider,
                reason = ?event.reason,
                automatic = event.is_automatic,
                "failover recorded"
            );
            state.events.push(event.clone());
        }
        self.notify(event);
        true
    }

    /// Watch appended events over a bounded queue; overflow is dropped
    /// rather than blocking the appender.
    pub fn watch(&self, capacity: usize) -> mpsc::Receiver<FailoverEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.watchers.lock().push(tx);
        rx
    }

    fn notify(&self, event: FailoverEvent) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("failover watcher queue full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Record an automatic transition between two candidates within one
    /// dispatch.
    pub fn record_automatic(
        &self,
        from: &str,
        to: &str,
        reason: FailoverReason,
        triggered_at: DateTime<Utc>,
    ) -> bool {
        self.append(FailoverEvent {
            from_provider: from.to_string(),
            to_provider: to.to_string(),
            reason,
            is_automatic: true,
            triggered_at,
            resolved_at: None,
        })
    }

    /// Record an operator-driven switch between primaries.
    pub fn record_manual(&self, from: &str, to: &str, triggered_at: DateTime<Utc>) -> bool {
        self.append(FailoverEvent {
            from_provider: from.to_string(),
            to_provider: to.to_string(),
            reason: FailoverReason::Manual,
            is_automatic: false,
            triggered_at,
            resolved_at: None,
        })
    }

    /// Most-recent-first view, capped at `limit`.
    pub fn recent(&self, limit: usize) -> Vec<FailoverEvent> {
        let state = self.inner.lock();
        state.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn truncate_to_second(at: DateTime<Utc>) -> i64 {
    at.with_nanosecond(0).map_or(at.timestamp(), |t| t.timestamp())
}
