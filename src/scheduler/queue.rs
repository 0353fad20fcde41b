//! Work-conserving priority scheduler with aging and proportional fairness.

use std::collections::HashMap;
use std::sync::Arc;

use super::priority::{priority_score, Candidate};
use super::queued_entry::{EntrySnapshot, EntryState, QueuedEntry};
use super::{Dispatch, Scheduler, SchedulerConfig, SchedulerError, SchedulerKind, SchedulerStats};
use crate::capacity::CapacityBudget;
use crate::clock::{system_clock, SharedClock};
use crate::request::{Request, RequestId};
use crate::tier::{PerTier, Tier};

/// Aging priority queue with a per-tier fairness override.
///
/// Scores are recomputed on every selection since they depend on the
/// current time. Selection is linear in the number of queued entries.
pub struct WorkConservingScheduler {
    config: SchedulerConfig,
    clock: SharedClock,
    entries: HashMap<RequestId, QueuedEntry>,
    stats: SchedulerStats,
    next_sequence: u64,
}

impl WorkConservingScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: system_clock(),
            entries: HashMap::new(),
            stats: SchedulerStats::default(),
            next_sequence: 0,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn score(&self, entry: &QueuedEntry, now: std::time::Instant) -> f64 {
        priority_score(&self.config.policy, entry.tier(), entry.age(now), self.config.aging_cap())
    }

    fn sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn insert(&mut self, entry: QueuedEntry) -> Result<(), SchedulerError> {
        if self.entries.contains_key(entry.id()) {
            return Err(SchedulerError::DuplicateRequest(entry.id().clone()));
        }
        match entry.state {
            EntryState::Queued => self.stats.queued.increment(entry.tier()),
            EntryState::Processing => self.stats.processing.increment(entry.tier()),
        }
        self.entries.insert(entry.id().clone(), entry);
        Ok(())
    }
}

impl Default for WorkConservingScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler for WorkConservingScheduler {
    fn enqueue(&mut self, request: Request) -> Result<(), SchedulerError> {
        let seq = self.sequence();
        let entry = QueuedEntry::queued(request, self.clock.now(), seq);
        tracing::trace!(
            request_id = %entry.id(),
            tier = %entry.tier(),
            priority = self.score(&entry, entry.enqueued_at),
            "enqueued"
        );
        self.insert(entry)
    }

    fn begin_processing(&mut self, request: Request) -> Result<Dispatch, SchedulerError> {
        let seq = self.sequence();
        let entry = QueuedEntry::processing(request, self.clock.now(), seq);
        let request = Arc::clone(&entry.request);
        self.insert(entry)?;
        Ok(Dispatch { request, waited: std::time::Duration::ZERO })
    }

    fn select_next(&self, budget: &CapacityBudget) -> Option<Arc<Request>> {
        if budget.available == 0 {
            return None;
        }
        let now = self.clock.now();
        let mut best: Option<Candidate<'_, QueuedEntry>> = None;
        let mut best_by_tier: PerTier<Option<Candidate<'_, QueuedEntry>>> = PerTier::default();

        for entry in self.entries.values().filter(|e| e.state == EntryState::Queued) {
            let candidate = Candidate {
                score: self.score(entry, now),
                sequence: entry.sequence,
                item: entry,
            };
            if best.map_or(true, |b| candidate > b) {
                best = Some(candidate);
            }
            let slot = best_by_tier.get_mut(entry.tier());
            if slot.map_or(true, |b| candidate > b) {
                *slot = Some(candidate);
            }
        }
        let top = best?;

        // First under-served tier with demand takes the slot.
        let allocation = self.config.policy.allocation(budget.max_concurrent);
        for tier in Tier::ALL {
            if self.stats.processing.get(tier) < allocation.get(tier) {
                if let Some(candidate) = best_by_tier.get(tier) {
                    return Some(Arc::clone(&candidate.item.request));
                }
            }
        }
        Some(Arc::clone(&top.item.request))
    }

    fn mark_processing(&mut self, id: &RequestId) -> Result<Dispatch, SchedulerError> {
        let now = self.clock.now();
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownRequest(id.clone()))?;
        if entry.state != EntryState::Queued {
            return Err(SchedulerError::InvalidTransition { id: id.clone(), state: entry.state });
        }
        entry.state = EntryState::Processing;
        entry.processing_since = Some(now);
        let tier = entry.tier();
        let dispatch = Dispatch { request: Arc::clone(&entry.request), waited: entry.waited() };
        self.stats.queued.decrement(tier);
        self.stats.processing.increment(tier);
        Ok(dispatch)
    }

    fn complete(&mut self, id: &RequestId) -> Result<QueuedEntry, SchedulerError> {
        match self.entries.get(id).map(|e| e.state) {
            None => Err(SchedulerError::UnknownRequest(id.clone())),
            Some(EntryState::Queued) => Err(SchedulerError::InvalidTransition {
                id: id.clone(),
                state: EntryState::Queued,
            }),
            Some(EntryState::Processing) => {
                let entry = self
                    .entries
                    .remove(id)
                    .ok_or_else(|| SchedulerError::UnknownRequest(id.clone()))?;
                self.stats.processing.decrement(entry.tier());
                Ok(entry)
            }
        }
    }

    fn remove(&mut self, id: &RequestId) -> Option<Arc<Request>> {
        if self.entries.get(id)?.state != EntryState::Queued {
            return None;
        }
        let entry = self.entries.remove(id)?;
        self.stats.queued.decrement(entry.tier());
        Some(entry.request)
    }

    fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    fn stats(&self) -> SchedulerStats {
        self.stats
    }

    fn entries(&self) -> Vec<EntrySnapshot> {
        let now = self.clock.now();
        let mut list: Vec<(&QueuedEntry, EntrySnapshot)> = self
            .entries
            .values()
            .map(|e| {
                let priority = (e.state == EntryState::Queued).then(|| self.score(e, now));
                (e, e.snapshot(now, priority))
            })
            .collect();
        list.sort_by_key(|(e, _)| (e.state == EntryState::Processing, e.sequence));
        list.into_iter().map(|(_, s)| s).collect()
    }

    fn allocation(&self, max_concurrent: usize) -> PerTier<usize> {
        self.config.policy.allocation(max_concurrent)
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::WorkConserving
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
