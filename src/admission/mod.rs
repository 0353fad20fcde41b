//! Admission orchestration.
//!
//! [`AdmissionController`] is the single entry and exit point of the core.
//! Each submission is checked against the capacity budget and the circuit
//! breaker, then either dispatched immediately or queued. Every completion
//! pulls the next queued request, so no polling loop is needed.
//!
//! All bookkeeping (scheduler, capacity estimator, breaker, waiter table,
//! stats) sits behind one mutex that is never held across an `.await`.
//! Backend calls run on spawned tasks outside it.

mod error;
mod events;
mod executor;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tracing::{Instrument, Span};

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::capacity::{CapacityBudget, CapacityConfig, CapacityEstimator};
use crate::clock::{system_clock, SharedClock};
use crate::health::{HealthChecker, HealthConfig, HealthInputs, HealthReport};
use crate::request::{Request, RequestId};
use crate::scheduler::{self, Dispatch, Scheduler, SchedulerConfig};
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard, ShutdownResult, ShutdownState};
use crate::stats::{DetailedStats, MetricsSnapshot, StatsAggregator};
use crate::telemetry::{self, RequestSpan, SpanExt};
use crate::tier::Tier;

pub use error::{AdmissionError, BackendError};
pub use events::{AdmissionEvent, DispatchPath, EventBus};
pub use executor::{
    BackendExecutor, ExecutionMode, ExecutionOutput, ExecutionRouter, SimulatedExecutor,
    SimulatorConfig, UsageStats,
};

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub scheduler: SchedulerConfig,
    pub capacity: CapacityConfig,
    pub breaker: BreakerConfig,
    pub health: HealthConfig,
    /// Observer channel capacity.
    pub event_buffer: usize,
    /// Completion history kept for reporting.
    pub stats_retention_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            capacity: CapacityConfig::default(),
            breaker: BreakerConfig::default(),
            health: HealthConfig::default(),
            event_buffer: 256,
            stats_retention_secs: 300,
        }
    }
}

/// Successful outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub id: RequestId,
    pub tier: Tier,
    pub path: DispatchPath,
    pub output: ExecutionOutput,
    /// Time spent queued.
    pub waited: Duration,
    /// Backend call duration.
    pub processing: Duration,
}

type Outcome = Result<Completion, AdmissionError>;

/// Caller waiting on an admitted request.
struct Waiter {
    tx: oneshot::Sender<Outcome>,
    path: DispatchPath,
    span: Span,
    // Dropped once the caller is resolved, releasing drain.
    _guard: ShutdownGuard,
}

/// A dispatch decided under the lock, spawned after it is released.
struct Launch {
    dispatch: Dispatch,
    span: Span,
}

struct CoreState {
    scheduler: Box<dyn Scheduler>,
    capacity: CapacityEstimator,
    breaker: CircuitBreaker,
    waiters: HashMap<RequestId, Waiter>,
    stats: StatsAggregator,
}

impl CoreState {
    fn budget(&mut self) -> CapacityBudget {
        let processing = self.scheduler.stats().total_processing();
        self.capacity.refresh_budget(processing)
    }

    fn publish_transitions(&mut self, events: &EventBus) {
        for t in self.breaker.take_transitions() {
            events.publish(AdmissionEvent::BreakerTransition { from: t.from, to: t.to });
        }
    }

    /// Move queued requests to processing while the budget has room.
    fn pull_ready(&mut self, events: &EventBus) -> Vec<Launch> {
        let mut launches = Vec::new();
        loop {
            let budget = self.budget();
            let Some(next) = self.scheduler.select_next(&budget) else {
                break;
            };
            let dispatch = match self.scheduler.mark_processing(&next.id) {
                Ok(dispatch) => dispatch,
                Err(err) => {
                    tracing::error!(request_id = %next.id, error = %err, "selected request could not be dispatched");
                    break;
                }
            };
            self.capacity.record_start();

            let span = match self.waiters.get(&next.id) {
                Some(waiter) => waiter.span.clone(),
                None => {
                    tracing::error!(request_id = %next.id, "dispatching request without a waiter");
                    Span::none()
                }
            };
            let waited_ms = dispatch.waited.as_millis() as u64;
            span.record("waited_ms", waited_ms);
            tracing::debug!(parent: &span, waited_ms, "dispatching queued request");
            events.publish(AdmissionEvent::Dispatched {
                id: next.id.clone(),
                tier: next.tier,
                waited_ms,
            });
            launches.push(Launch { dispatch, span });
        }
        self.record_queue_depths();
        launches
    }

    fn record_queue_depths(&self) {
        for (tier, depth) in self.scheduler.stats().queued.iter() {
            telemetry::record_queue_depth(tier, *depth);
        }
    }

    fn reject(&mut self, events: &EventBus, id: RequestId, tier: Tier, err: AdmissionError) -> AdmissionError {
        let reason = match &err {
            AdmissionError::CircuitBreakerOpen { .. } => "circuit_breaker",
            AdmissionError::ShuttingDown => "shutting_down",
            AdmissionError::DuplicateRequest(_) => "duplicate",
            _ => "other",
        };
        self.stats.record_rejection();
        telemetry::record_rejection(tier, reason);
        tracing::debug!(request_id = %id, %tier, reason, "request rejected");
        events.publish(AdmissionEvent::Rejected { id, tier, reason: err.to_string() });
        err
    }
}

struct Inner {
    state: Mutex<CoreState>,
    executor: Arc<dyn BackendExecutor>,
    clock: SharedClock,
    shutdown: ShutdownCoordinator,
    events: EventBus,
    health: HealthChecker,
}

impl Inner {
    /// Record a finished backend call and resolve its caller.
    ///
    /// Returns the queued requests that the freed slot allows to start.
    fn finish(
        &self,
        request: &Request,
        waited: Duration,
        processing: Duration,
        result: Result<ExecutionOutput, BackendError>,
    ) -> Vec<Launch> {
        let success = result.is_ok();
        let tier = request.tier;

        let (waiter, launches) = {
            let mut state = self.state.lock();
            state.capacity.record_complete(processing, !success);
            if success {
                state.breaker.record_success();
            } else {
                state.breaker.record_failure(tier);
            }
            state.publish_transitions(&self.events);

            if let Err(err) = state.scheduler.complete(&request.id) {
                tracing::error!(request_id = %request.id, error = %err, "completed request was not tracked");
            }
            state.stats.record_completion(tier, waited, processing, success);
            self.events.publish(AdmissionEvent::Completed {
                id: request.id.clone(),
                tier,
                success,
                processing_ms: processing.as_millis() as u64,
            });

            let waiter = state.waiters.remove(&request.id);
            let launches = state.pull_ready(&self.events);
            (waiter, launches)
        };

        telemetry::record_completion(tier, success, waited);
        telemetry::record_backend_latency(tier, processing);

        let Some(waiter) = waiter else {
            tracing::error!(request_id = %request.id, "no caller registered for completed request");
            return launches;
        };
        waiter.span.record("latency_ms", processing.as_millis() as u64);
        let outcome = result
            .map(|output| Completion {
                id: request.id.clone(),
                tier,
                path: waiter.path,
                output,
                waited,
                processing,
            })
            .map_err(|source| AdmissionError::Backend {
                id: request.id.clone(),
                tier,
                source,
            });
        // The caller may have stopped waiting; the outcome is still accounted.
        let _ = waiter.tx.send(outcome);
        launches
    }
}

fn spawn_dispatch(inner: Arc<Inner>, launch: Launch) {
    let Launch { dispatch, span } = launch;
    let task = async move {
        let request = dispatch.request;
        let started = inner.clock.now();
        let result = AssertUnwindSafe(inner.executor.execute(&request.payload, request.overrides))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(BackendError::Failed("executor panicked".to_string())));
        let processing = inner.clock.now().saturating_duration_since(started);

        for next in inner.finish(&request, dispatch.waited, processing, result) {
            spawn_dispatch(Arc::clone(&inner), next);
        }
    };
    tokio::spawn(task.instrument(span));
}

/// Tiered admission controller. Cheap to clone; clones share state.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, executor: Arc<dyn BackendExecutor>) -> Self {
        Self::with_clock(config, executor, system_clock())
    }

    pub fn with_clock(config: AdmissionConfig, executor: Arc<dyn BackendExecutor>, clock: SharedClock) -> Self {
        let max_records = config.capacity.max_samples;
        let state = CoreState {
            scheduler: scheduler::build(&config.scheduler, Arc::clone(&clock)),
            capacity: CapacityEstimator::new(config.capacity).with_clock(Arc::clone(&clock)),
            breaker: CircuitBreaker::new(config.breaker).with_clock(Arc::clone(&clock)),
            waiters: HashMap::new(),
            stats: StatsAggregator::new(Duration::from_secs(config.stats_retention_secs))
                .with_clock(Arc::clone(&clock))
                .with_max_records(max_records),
        };
        tracing::info!(scheduler = ?state.scheduler.kind(), "admission controller initialized");

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                executor,
                clock,
                shutdown: ShutdownCoordinator::new(),
                events: EventBus::new(config.event_buffer),
                health: HealthChecker::new(config.health),
            }),
        }
    }

    /// Submit a request and wait for its outcome.
    ///
    /// Resolves after the backend call completes, or immediately with a
    /// rejection. Dropping the future does not cancel an admitted request.
    pub async fn submit(&self, request: Request) -> Result<Completion, AdmissionError> {
        let span = RequestSpan::new(&request.id, request.tier);
        let result = match self.admit(request, span.clone()) {
            Ok(rx) => rx
                .await
                .unwrap_or_else(|_| Err(AdmissionError::Internal("completion channel closed".to_string()))),
            Err(err) => Err(err),
        };
        span.record_result(&result);
        result
    }

    fn admit(&self, request: Request, span: Span) -> Result<oneshot::Receiver<Outcome>, AdmissionError> {
        let inner = &self.inner;
        let mut launches = Vec::new();

        let result = {
            let mut state = inner.state.lock();
            state.stats.record_submission();
            // Capacity may have grown since the last completion; queued
            // entries get the free slots before the newcomer is considered.
            if state.scheduler.stats().total_queued() > 0 {
                launches.extend(state.pull_ready(&inner.events));
            }
            self.admit_locked(&mut state, request, span, &mut launches)
        };

        for launch in launches {
            spawn_dispatch(Arc::clone(inner), launch);
        }
        result
    }

    fn admit_locked(
        &self,
        state: &mut CoreState,
        request: Request,
        span: Span,
        launches: &mut Vec<Launch>,
    ) -> Result<oneshot::Receiver<Outcome>, AdmissionError> {
        let inner = &self.inner;
        let id = request.id.clone();
        let tier = request.tier;

        let Some(guard) = inner.shutdown.track() else {
            return Err(state.reject(&inner.events, id, tier, AdmissionError::ShuttingDown));
        };
        if state.scheduler.contains(&id) {
            let err = AdmissionError::DuplicateRequest(id.clone());
            return Err(state.reject(&inner.events, id, tier, err));
        }

        let budget = state.budget();
        let allowed = state.breaker.can_process(tier, &budget);
        state.publish_transitions(&inner.events);
        if !allowed {
            let err = AdmissionError::CircuitBreakerOpen {
                tier,
                state: state.breaker.state(),
                error_rate: budget.error_rate,
            };
            return Err(state.reject(&inner.events, id, tier, err));
        }

        let (tx, rx) = oneshot::channel();
        if state.scheduler.can_dispatch_now(tier, &budget) {
            let dispatch = state.scheduler.begin_processing(request)?;
            state.capacity.record_start();
            span.record("dispatch_path", DispatchPath::Immediate.as_str());
            span.record("waited_ms", 0u64);
            state.waiters.insert(
                id.clone(),
                Waiter { tx, path: DispatchPath::Immediate, span: span.clone(), _guard: guard },
            );
            telemetry::record_admission(tier, DispatchPath::Immediate.as_str());
            inner.events.publish(AdmissionEvent::Admitted {
                id: id.clone(),
                tier,
                path: DispatchPath::Immediate,
            });
            inner.events.publish(AdmissionEvent::Dispatched { id, tier, waited_ms: 0 });
            launches.push(Launch { dispatch, span });
        } else {
            state.scheduler.enqueue(request)?;
            span.record("dispatch_path", DispatchPath::Queued.as_str());
            state.waiters.insert(
                id.clone(),
                Waiter { tx, path: DispatchPath::Queued, span, _guard: guard },
            );
            telemetry::record_admission(tier, DispatchPath::Queued.as_str());
            inner.events.publish(AdmissionEvent::Admitted { id, tier, path: DispatchPath::Queued });
        }
        // A slot may have freed since the budget was read.
        launches.extend(state.pull_ready(&inner.events));
        Ok(rx)
    }

    /// Withdraw a queued request. Its caller resolves with
    /// [`AdmissionError::Cancelled`]. Returns false if `id` is not queued.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let waiter = {
            let mut state = self.inner.state.lock();
            let Some(request) = state.scheduler.remove(id) else {
                return false;
            };
            state.stats.record_cancellation();
            state.record_queue_depths();
            self.inner.events.publish(AdmissionEvent::Cancelled { id: id.clone(), tier: request.tier });
            state.waiters.remove(id)
        };
        if let Some(waiter) = waiter {
            let _ = waiter.tx.send(Err(AdmissionError::Cancelled(id.clone())));
        }
        true
    }

    /// Observe lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<AdmissionEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let state = self.inner.state.lock();
        let sched = state.scheduler.stats();
        let summary = state.stats.summary();
        let counters = state.stats.counters();
        MetricsSnapshot {
            total_requests: counters.total,
            active_requests: sched.total_queued() + sched.total_processing(),
            queue_depth: sched.queued,
            avg_response_time_ms: as_millis_f64(summary.avg_processing),
            counters,
        }
    }

    pub fn detailed_stats(&self) -> DetailedStats {
        let state = self.inner.state.lock();
        let sched = state.scheduler.stats();
        let budget = state.capacity.current_budget(sched.total_processing());
        let summary = state.stats.summary();
        DetailedStats {
            scheduler: state.scheduler.kind(),
            queue_depth: sched.queued,
            processing: sched.processing,
            allocation: state.scheduler.allocation(budget.max_concurrent),
            avg_wait_time_ms: as_millis_f64(summary.avg_wait),
            avg_processing_time_ms: as_millis_f64(summary.avg_processing),
            processing_rate_per_minute: summary.rate_per_minute,
            completed_by_tier: summary.completed,
            active_requests: state.scheduler.entries(),
            counters: state.stats.counters(),
            breaker: state.breaker.snapshot(),
            budget,
        }
    }

    /// Current budget against the live processing count.
    pub fn capacity_budget(&self) -> CapacityBudget {
        let state = self.inner.state.lock();
        state.capacity.current_budget(state.scheduler.stats().total_processing())
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.inner.state.lock().breaker.state()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.inner.shutdown.state()
    }

    pub fn health(&self) -> HealthReport {
        let (breaker, sched) = {
            let state = self.inner.state.lock();
            (state.breaker.state(), state.scheduler.stats())
        };
        self.inner.health.report(HealthInputs {
            shutdown: self.inner.shutdown.state(),
            breaker,
            queue_depth: sched.total_queued(),
            processing: sched.total_processing(),
        })
    }

    /// Stop accepting submissions and wait until every admitted request,
    /// queued or processing, has resolved.
    pub async fn drain(&self) {
        self.inner.shutdown.drain().await;
    }

    /// [`drain`](Self::drain) bounded by `timeout`.
    pub async fn drain_with_timeout(&self, timeout: Duration) -> ShutdownResult {
        self.inner.shutdown.initiate(timeout).await
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
