//! Dynamic capacity estimation from rolling latency and error history.
//!
//! The admitted concurrency follows measured backend latency: fast
//! responses open more slots, slow responses close them.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::clock::{system_clock, SharedClock};
use crate::telemetry;

/// Latency bound mapped to a concurrency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyThreshold {
    /// Applies when the rolling average is strictly below this many ms.
    pub below_ms: u64,
    pub max_concurrent: usize,
}

/// Configuration for capacity estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Window feeding the admission decision.
    pub decision_window_secs: u64,
    /// Samples older than this are discarded on every write.
    pub retention_secs: u64,
    /// Hard cap on retained samples per history.
    pub max_samples: usize,
    pub thresholds: Vec<ConcurrencyThreshold>,
    /// Concurrency when the average exceeds every threshold.
    pub fallback_concurrency: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            decision_window_secs: 60,
            retention_secs: 300,
            max_samples: 1000,
            thresholds: vec![
                ConcurrencyThreshold { below_ms: 1_000, max_concurrent: 6 },
                ConcurrencyThreshold { below_ms: 5_000, max_concurrent: 4 },
                ConcurrencyThreshold { below_ms: 15_000, max_concurrent: 2 },
            ],
            fallback_concurrency: 1,
        }
    }
}

impl CapacityConfig {
    pub fn decision_window(&self) -> Duration {
        Duration::from_secs(self.decision_window_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// True when slower latency bands never grant more slots than faster ones.
    pub fn is_monotonic(&self) -> bool {
        let mut sorted = self.thresholds.clone();
        sorted.sort_by_key(|t| t.below_ms);
        sorted
            .windows(2)
            .all(|w| w[0].max_concurrent >= w[1].max_concurrent)
            && sorted
                .last()
                .map_or(true, |t| t.max_concurrent >= self.fallback_concurrency)
    }
}

/// Point-in-time admission budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityBudget {
    pub max_concurrent: usize,
    pub current_processing: usize,
    pub available: usize,
    pub avg_response_time: Duration,
    pub error_rate: f64,
    pub sample_count: usize,
}

impl CapacityBudget {
    pub fn new(max_concurrent: usize, current_processing: usize) -> Self {
        Self {
            max_concurrent,
            current_processing,
            available: max_concurrent.saturating_sub(current_processing),
            avg_response_time: Duration::ZERO,
            error_rate: 0.0,
            sample_count: 0,
        }
    }

    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }
}

/// Aggregates over a time window, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub completed: usize,
    pub errors: usize,
    pub avg_response_time: Duration,
    pub error_rate: f64,
}

/// One observed unit of work.
#[derive(Debug, Clone, Copy)]
struct CapacitySample {
    started_at: Instant,
    completed_at: Option<Instant>,
    response_time: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
struct ErrorSample {
    at: Instant,
    is_error: bool,
}

/// Rolling latency/error tracker producing a [`CapacityBudget`].
pub struct CapacityEstimator {
    config: CapacityConfig,
    clock: SharedClock,
    samples: VecDeque<CapacitySample>,
    errors: VecDeque<ErrorSample>,
    last_max_concurrent: Option<usize>,
}

impl CapacityEstimator {
    pub fn new(mut config: CapacityConfig) -> Self {
        config.thresholds.sort_by_key(|t| t.below_ms);
        config.fallback_concurrency = config.fallback_concurrency.max(1);
        config.max_samples = config.max_samples.max(1);
        Self {
            config,
            clock: system_clock(),
            samples: VecDeque::new(),
            errors: VecDeque::new(),
            last_max_concurrent: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CapacityConfig {
        &self.config
    }

    /// Mark the start of a unit of work.
    pub fn record_start(&mut self) {
        let now = self.clock.now();
        self.samples.push_back(CapacitySample {
            started_at: now,
            completed_at: None,
            response_time: None,
        });
        self.prune(now);
    }

    /// Close the most recent open sample and append an error/total pair.
    pub fn record_complete(&mut self, response_time: Duration, is_error: bool) {
        let now = self.clock.now();
        match self.samples.iter_mut().rev().find(|s| s.response_time.is_none()) {
            Some(open) => {
                open.completed_at = Some(now);
                open.response_time = Some(response_time);
            }
            // Start already pruned; keep the measurement anyway.
            None => self.samples.push_back(CapacitySample {
                started_at: now.checked_sub(response_time).unwrap_or(now),
                completed_at: Some(now),
                response_time: Some(response_time),
            }),
        }
        self.errors.push_back(ErrorSample { at: now, is_error });
        self.prune(now);
    }

    /// Budget over the decision window given the current in-flight count.
    pub fn current_budget(&self, current_processing: usize) -> CapacityBudget {
        let stats = self.window_stats(self.config.decision_window());
        let max_concurrent = self.concurrency_for(stats.avg_response_time);
        CapacityBudget {
            avg_response_time: stats.avg_response_time,
            error_rate: stats.error_rate,
            sample_count: stats.completed,
            ..CapacityBudget::new(max_concurrent, current_processing)
        }
    }

    /// Same as [`current_budget`](Self::current_budget), logging and
    /// publishing changes to the concurrency level.
    pub fn refresh_budget(&mut self, current_processing: usize) -> CapacityBudget {
        let budget = self.current_budget(current_processing);
        if self.last_max_concurrent != Some(budget.max_concurrent) {
            if let Some(previous) = self.last_max_concurrent {
                tracing::info!(
                    previous,
                    max_concurrent = budget.max_concurrent,
                    avg_response_ms = budget.avg_response_time.as_millis() as u64,
                    "capacity recalculated"
                );
            }
            telemetry::record_max_concurrent(budget.max_concurrent);
            self.last_max_concurrent = Some(budget.max_concurrent);
        }
        budget
    }

    /// Aggregates over completions within `window` of now.
    pub fn window_stats(&self, window: Duration) -> WindowStats {
        let now = self.clock.now();
        let cutoff = now.checked_sub(window);
        let in_window = |at: Instant| cutoff.map_or(true, |c| at >= c);

        let (count, total) = self
            .samples
            .iter()
            .filter_map(|s| match (s.completed_at, s.response_time) {
                (Some(at), Some(rt)) if in_window(at) => Some(rt),
                _ => None,
            })
            .fold((0u32, Duration::ZERO), |(n, sum), rt| (n + 1, sum + rt));

        let (outcomes, errors) = self
            .errors
            .iter()
            .filter(|e| in_window(e.at))
            .fold((0usize, 0usize), |(n, errs), e| (n + 1, errs + e.is_error as usize));

        WindowStats {
            completed: outcomes,
            errors,
            avg_response_time: if count == 0 { Duration::ZERO } else { total / count },
            error_rate: if outcomes == 0 { 0.0 } else { errors as f64 / outcomes as f64 },
        }
    }

    /// Open samples (started, not completed).
    pub fn open_samples(&self) -> usize {
        self.samples.iter().filter(|s| s.response_time.is_none()).count()
    }

    /// Map an average latency onto the discrete concurrency table.
    pub fn concurrency_for(&self, avg_response_time: Duration) -> usize {
        let ms = avg_response_time.as_millis();
        self.config
            .thresholds
            .iter()
            .find(|t| ms < u128::from(t.below_ms))
            .map_or(self.config.fallback_concurrency, |t| t.max_concurrent.max(1))
    }

    fn prune(&mut self, now: Instant) {
        if let Some(cutoff) = now.checked_sub(self.config.retention()) {
            // Open samples are kept until completed so their start is not lost.
            self.samples
                .retain(|s| s.response_time.is_none() || s.completed_at.unwrap_or(s.started_at) >= cutoff);
            while self.errors.front().is_some_and(|e| e.at < cutoff) {
                self.errors.pop_front();
            }
        }
        let cap = self.config.max_samples;
        while self.samples.len() > cap {
            match self.samples.iter().position(|s| s.response_time.is_some()) {
                Some(oldest_closed) => {
                    self.samples.remove(oldest_closed);
                }
                None => break,
            }
        }
        while self.errors.len() > cap {
            self.errors.pop_front();
        }
    }
}

impl Default for CapacityEstimator {
    fn default() -> Self {
        Self::new(CapacityConfig::default())
    }
}
