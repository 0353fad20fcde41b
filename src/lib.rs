//! tiergate: tiered request admission and priority scheduling.
//!
//! Decides, per request, whether to run it now, queue it, or reject it, so
//! that a shared backend is used fully without letting any client tier
//! starve another.
//!
//! # Components
//!
//! - **Scheduler**: aging priority queue with proportional fairness across
//!   the `enterprise`, `premium` and `free` tiers.
//! - **Capacity estimator**: derives the concurrency limit from measured
//!   backend latency.
//! - **Circuit breaker**: global failure gate with tier-specific error
//!   tolerance.
//! - **Admission controller**: composes the above; every completion pulls
//!   the next queued request.
//!
//! The core has no transport of its own. A host submits requests through
//! [`AdmissionController::submit`] and polls
//! [`metrics`](AdmissionController::metrics) /
//! [`detailed_stats`](AdmissionController::detailed_stats) or subscribes to
//! [`AdmissionEvent`]s.

pub mod admission;
pub mod breaker;
pub mod capacity;
pub mod cli;
pub mod clock;
pub mod config;
pub mod health;
pub mod request;
pub mod scheduler;
pub mod shutdown;
pub mod stats;
pub mod telemetry;
pub mod tier;

pub use admission::{
    AdmissionConfig, AdmissionController, AdmissionError, AdmissionEvent, BackendError,
    BackendExecutor, Completion, DispatchPath, ExecutionMode, ExecutionOutput, ExecutionRouter,
    SimulatedExecutor, SimulatorConfig, UsageStats,
};
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use capacity::{CapacityBudget, CapacityConfig, CapacityEstimator};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, GatewayConfig};
pub use request::{ExecutionOverrides, Payload, Request, RequestId};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerKind};
pub use stats::{DetailedStats, MetricsSnapshot, RequestCounters};
pub use tier::{PerTier, Tier, TierPolicy};
