//! Request scheduling for the admission controller.
//!
//! Holds queued requests and decides which one to dispatch next given a
//! capacity budget. Two interchangeable implementations sit behind the
//! [`Scheduler`] trait:
//!
//! - [`WorkConservingScheduler`]: aging priority plus proportional fairness.
//! - [`FixedConcurrencyScheduler`]: static per-tier slots, FIFO within a tier.

mod fixed;
mod priority;
mod queue;
mod queued_entry;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capacity::CapacityBudget;
use crate::clock::SharedClock;
use crate::request::{Request, RequestId};
use crate::tier::{PerTier, Tier, TierPolicy};

pub use fixed::FixedConcurrencyScheduler;
pub use priority::{priority_score, Candidate};
pub use queue::WorkConservingScheduler;
pub use queued_entry::{EntrySnapshot, EntryState, QueuedEntry};

/// Scheduler bookkeeping errors. All indicate a caller bug.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("request {0} is already tracked")]
    DuplicateRequest(RequestId),

    #[error("request {0} is not tracked")]
    UnknownRequest(RequestId),

    #[error("request {id} cannot move from {state:?}")]
    InvalidTransition { id: RequestId, state: EntryState },
}

/// Which scheduler implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    #[default]
    WorkConserving,
    FixedConcurrency,
}

impl std::str::FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work_conserving" | "work-conserving" => Ok(Self::WorkConserving),
            "fixed_concurrency" | "fixed-concurrency" | "legacy" => Ok(Self::FixedConcurrency),
            other => Err(format!("unknown scheduler: {other}")),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub kind: SchedulerKind,
    /// Aging bonus accrues one point per second up to this cap.
    pub aging_cap_secs: u64,
    pub policy: TierPolicy,
    /// Static per-tier slots for [`SchedulerKind::FixedConcurrency`].
    pub fixed_limits: PerTier<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::WorkConserving,
            aging_cap_secs: 20,
            policy: TierPolicy::default(),
            fixed_limits: PerTier::new(3, 2, 1),
        }
    }
}

impl SchedulerConfig {
    pub fn aging_cap(&self) -> Duration {
        Duration::from_secs(self.aging_cap_secs)
    }
}

/// A request leaving the queue for the backend.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub request: Arc<Request>,
    /// Time spent queued; zero on the immediate path.
    pub waited: Duration,
}

/// Per-tier counts for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub queued: PerTier<usize>,
    pub processing: PerTier<usize>,
}

impl SchedulerStats {
    pub fn total_queued(&self) -> usize {
        self.queued.total()
    }

    pub fn total_processing(&self) -> usize {
        self.processing.total()
    }
}

/// Queue bookkeeping capability. Implementations perform no I/O.
pub trait Scheduler: Send {
    /// Track a request in state `queued`. No capacity check.
    fn enqueue(&mut self, request: Request) -> Result<(), SchedulerError>;

    /// Track a request directly in state `processing` (immediate path).
    fn begin_processing(&mut self, request: Request) -> Result<Dispatch, SchedulerError>;

    /// Choose the queued request to dispatch next, without changing state.
    fn select_next(&self, budget: &CapacityBudget) -> Option<Arc<Request>>;

    /// `queued` -> `processing`.
    fn mark_processing(&mut self, id: &RequestId) -> Result<Dispatch, SchedulerError>;

    /// Stop tracking a `processing` request.
    fn complete(&mut self, id: &RequestId) -> Result<QueuedEntry, SchedulerError>;

    /// Drop a `queued` request without dispatching it.
    fn remove(&mut self, id: &RequestId) -> Option<Arc<Request>>;

    fn contains(&self, id: &RequestId) -> bool;

    fn stats(&self) -> SchedulerStats;

    /// Snapshot of every tracked entry, queued first.
    fn entries(&self) -> Vec<EntrySnapshot>;

    /// Concurrency slots each tier is entitled to under `max_concurrent`.
    fn allocation(&self, max_concurrent: usize) -> PerTier<usize>;

    /// Whether a newly submitted request of `tier` may skip the queue.
    fn can_dispatch_now(&self, _tier: Tier, budget: &CapacityBudget) -> bool {
        budget.available > 0
    }

    fn kind(&self) -> SchedulerKind;
}

/// Build the configured scheduler.
pub fn build(config: &SchedulerConfig, clock: SharedClock) -> Box<dyn Scheduler> {
    match config.kind {
        SchedulerKind::WorkConserving => {
            Box::new(WorkConservingScheduler::new(config.clone()).with_clock(clock))
        }
        SchedulerKind::FixedConcurrency => {
            Box::new(FixedConcurrencyScheduler::new(config.fixed_limits).with_clock(clock))
        }
    }
}
