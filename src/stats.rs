//! Metrics aggregation for pull-based observability.
//!
//! Keeps a rolling list of completion records and lifetime counters. The
//! admission controller combines these with scheduler, capacity and breaker
//! state into [`MetricsSnapshot`] and [`DetailedStats`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerSnapshot;
use crate::capacity::CapacityBudget;
use crate::clock::{system_clock, SharedClock};
use crate::scheduler::{EntrySnapshot, SchedulerKind};
use crate::tier::{PerTier, Tier};

const DEFAULT_RETENTION: Duration = Duration::from_secs(300);
const RATE_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RECORDS: usize = 1000;

/// Lifetime request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounters {
    /// Every call to submit, including rejected ones.
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub cancelled: u64,
}

/// Compact snapshot for periodic polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    /// Queued plus processing.
    pub active_requests: usize,
    pub queue_depth: PerTier<usize>,
    pub avg_response_time_ms: f64,
    pub counters: RequestCounters,
}

/// Full diagnostic snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStats {
    pub scheduler: SchedulerKind,
    pub queue_depth: PerTier<usize>,
    pub processing: PerTier<usize>,
    pub allocation: PerTier<usize>,
    pub avg_wait_time_ms: f64,
    pub avg_processing_time_ms: f64,
    pub processing_rate_per_minute: f64,
    pub completed_by_tier: PerTier<usize>,
    pub active_requests: Vec<EntrySnapshot>,
    pub counters: RequestCounters,
    pub breaker: BreakerSnapshot,
    pub budget: CapacityBudget,
}

/// Aggregates over the retention window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub completed: PerTier<usize>,
    pub avg_wait: Duration,
    pub avg_processing: Duration,
    /// Completions within the last minute.
    pub rate_per_minute: f64,
}

#[derive(Debug, Clone, Copy)]
struct CompletionRecord {
    at: Instant,
    tier: Tier,
    waited: Duration,
    processing: Duration,
}

/// Rolling completion history plus counters.
pub struct StatsAggregator {
    retention: Duration,
    max_records: usize,
    clock: SharedClock,
    records: VecDeque<CompletionRecord>,
    counters: RequestCounters,
}

impl StatsAggregator {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            max_records: DEFAULT_MAX_RECORDS,
            clock: system_clock(),
            records: VecDeque::new(),
            counters: RequestCounters::default(),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Hard cap on retained completion records; oldest are dropped first.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub fn record_submission(&mut self) {
        self.counters.total += 1;
    }

    pub fn record_rejection(&mut self) {
        self.counters.rejected += 1;
    }

    pub fn record_cancellation(&mut self) {
        self.counters.cancelled += 1;
    }

    pub fn record_completion(&mut self, tier: Tier, waited: Duration, processing: Duration, success: bool) {
        if success {
            self.counters.succeeded += 1;
        } else {
            self.counters.failed += 1;
        }
        let now = self.clock.now();
        self.records.push_back(CompletionRecord { at: now, tier, waited, processing });
        self.prune(now);
    }

    pub fn counters(&self) -> RequestCounters {
        self.counters
    }

    pub fn summary(&self) -> CompletionSummary {
        let now = self.clock.now();
        let retained_after = now.checked_sub(self.retention);
        let rate_after = now.checked_sub(RATE_WINDOW);

        let mut summary = CompletionSummary::default();
        let mut count = 0u32;
        let mut wait_sum = Duration::ZERO;
        let mut processing_sum = Duration::ZERO;
        let mut recent = 0usize;

        for record in &self.records {
            if retained_after.is_some_and(|cutoff| record.at < cutoff) {
                continue;
            }
            count += 1;
            wait_sum += record.waited;
            processing_sum += record.processing;
            summary.completed.increment(record.tier);
            if rate_after.map_or(true, |cutoff| record.at >= cutoff) {
                recent += 1;
            }
        }

        if count > 0 {
            summary.avg_wait = wait_sum / count;
            summary.avg_processing = processing_sum / count;
        }
        summary.rate_per_minute = recent as f64 * 60.0 / RATE_WINDOW.as_secs_f64();
        summary
    }

    fn prune(&mut self, now: Instant) {
        if let Some(cutoff) = now.checked_sub(self.retention) {
            while self.records.front().is_some_and(|r| r.at < cutoff) {
                self.records.pop_front();
            }
        }
        while self.records.len() > self.max_records {
            self.records.pop_front();
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn aggregator() -> (StatsAggregator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (StatsAggregator::default().with_clock(clock.clone()), clock)
    }

    #[test]
    fn averages_and_rate() {
        let (mut agg, clock) = aggregator();
        agg.record_completion(Tier::Free, Duration::from_millis(100), Duration::from_millis(300), true);
        clock.advance(Duration::from_secs(90));
        agg.record_completion(Tier::Premium, Duration::from_millis(300), Duration::from_millis(500), false);

        let summary = agg.summary();
        assert_eq!(summary.avg_wait, Duration::from_millis(200));
        assert_eq!(summary.avg_processing, Duration::from_millis(400));
        assert_eq!(summary.completed, PerTier::new(0, 1, 1));
        // Only the second completion falls in the last minute.
        assert_eq!(summary.rate_per_minute, 1.0);

        let counters = agg.counters();
        assert_eq!((counters.succeeded, counters.failed), (1, 1));
    }

    #[test]
    fn record_cap_drops_oldest_within_retention() {
        let clock = Arc::new(ManualClock::new());
        let mut agg = StatsAggregator::default().with_clock(clock).with_max_records(3);
        agg.record_completion(Tier::Enterprise, Duration::ZERO, Duration::from_secs(9), true);
        for _ in 0..3 {
            agg.record_completion(Tier::Free, Duration::ZERO, Duration::from_secs(1), true);
        }

        let summary = agg.summary();
        assert_eq!(summary.completed, PerTier::new(0, 0, 3));
        assert_eq!(summary.avg_processing, Duration::from_secs(1));
        assert_eq!(agg.counters().succeeded, 4);
    }

    #[test]
    fn records_expire_after_retention_but_counters_do_not() {
        let (mut agg, clock) = aggregator();
        agg.record_submission();
        agg.record_completion(Tier::Enterprise, Duration::ZERO, Duration::from_secs(1), true);
        clock.advance(Duration::from_secs(301));

        let summary = agg.summary();
        assert_eq!(summary.completed.total(), 0);
        assert_eq!(summary.avg_processing, Duration::ZERO);
        assert_eq!(agg.counters().succeeded, 1);
        assert_eq!(agg.counters().total, 1);
    }
}
