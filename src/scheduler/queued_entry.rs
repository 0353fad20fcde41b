//! Scheduler-owned wrapper around a tracked request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{Request, RequestId};
use crate::tier::Tier;

/// Lifecycle of a tracked request. `completed` entries are removed, so
/// only the two live states are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Queued,
    Processing,
}

/// A request tracked by a scheduler.
#[derive(Debug, Clone)]
pub struct QueuedEntry {
    pub request: Arc<Request>,
    pub enqueued_at: Instant,
    /// Monotonic enqueue order, used for FIFO tie-breaks.
    pub sequence: u64,
    pub state: EntryState,
    pub processing_since: Option<Instant>,
}

impl QueuedEntry {
    pub fn queued(request: Request, enqueued_at: Instant, sequence: u64) -> Self {
        Self {
            request: Arc::new(request),
            enqueued_at,
            sequence,
            state: EntryState::Queued,
            processing_since: None,
        }
    }

    pub fn processing(request: Request, now: Instant, sequence: u64) -> Self {
        Self {
            request: Arc::new(request),
            enqueued_at: now,
            sequence,
            state: EntryState::Processing,
            processing_since: Some(now),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.request.id
    }

    pub fn tier(&self) -> Tier {
        self.request.tier
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    /// Time between enqueue and dispatch.
    pub fn waited(&self) -> Duration {
        self.processing_since
            .map_or(Duration::ZERO, |p| p.saturating_duration_since(self.enqueued_at))
    }

    pub fn snapshot(&self, now: Instant, priority: Option<f64>) -> EntrySnapshot {
        let waited = match self.state {
            EntryState::Queued => self.age(now),
            EntryState::Processing => self.waited(),
        };
        EntrySnapshot {
            id: self.request.id.clone(),
            tier: self.request.tier,
            state: self.state,
            submitted_at: self.request.submitted_at,
            waited_ms: waited.as_millis() as u64,
            processing_ms: self
                .processing_since
                .map(|p| now.saturating_duration_since(p).as_millis() as u64),
            priority,
        }
    }
}

/// Serializable view of one entry, for the active request list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub id: RequestId,
    pub tier: Tier,
    pub state: EntryState,
    pub submitted_at: DateTime<Utc>,
    pub waited_ms: u64,
    pub processing_ms: Option<u64>,
    /// Current score; only for queued entries.
    pub priority: Option<f64>,
}
