//! Legacy fixed-concurrency scheduler.
//!
//! Three independent FIFO queues, each with a static slot limit. No aging,
//! no fairness override. Kept for comparison against the work-conserving
//! scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::queued_entry::{EntrySnapshot, EntryState, QueuedEntry};
use super::{Dispatch, Scheduler, SchedulerError, SchedulerKind, SchedulerStats};
use crate::capacity::CapacityBudget;
use crate::clock::{system_clock, SharedClock};
use crate::request::{Request, RequestId};
use crate::tier::{PerTier, Tier};

pub struct FixedConcurrencyScheduler {
    limits: PerTier<usize>,
    clock: SharedClock,
    queues: PerTier<VecDeque<RequestId>>,
    entries: HashMap<RequestId, QueuedEntry>,
    stats: SchedulerStats,
    next_sequence: u64,
}

impl FixedConcurrencyScheduler {
    pub fn new(limits: PerTier<usize>) -> Self {
        Self {
            limits: limits.map(|_, l| (*l).max(1)),
            clock: system_clock(),
            queues: PerTier::default(),
            entries: HashMap::new(),
            stats: SchedulerStats::default(),
            next_sequence: 0,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn limits(&self) -> PerTier<usize> {
        self.limits
    }

    fn has_slot(&self, tier: Tier) -> bool {
        self.stats.processing.get(tier) < self.limits.get(tier)
    }

    fn sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }
}

impl Scheduler for FixedConcurrencyScheduler {
    fn enqueue(&mut self, request: Request) -> Result<(), SchedulerError> {
        if self.entries.contains_key(&request.id) {
            return Err(SchedulerError::DuplicateRequest(request.id));
        }
        let seq = self.sequence();
        let entry = QueuedEntry::queued(request, self.clock.now(), seq);
        let tier = entry.tier();
        self.queues.get_mut(tier).push_back(entry.id().clone());
        self.stats.queued.increment(tier);
        self.entries.insert(entry.id().clone(), entry);
        Ok(())
    }

    fn begin_processing(&mut self, request: Request) -> Result<Dispatch, SchedulerError> {
        if self.entries.contains_key(&request.id) {
            return Err(SchedulerError::DuplicateRequest(request.id));
        }
        let seq = self.sequence();
        let entry = QueuedEntry::processing(request, self.clock.now(), seq);
        let dispatch = Dispatch { request: Arc::clone(&entry.request), waited: Duration::ZERO };
        self.stats.processing.increment(entry.tier());
        self.entries.insert(entry.id().clone(), entry);
        Ok(dispatch)
    }

    fn select_next(&self, budget: &CapacityBudget) -> Option<Arc<Request>> {
        if budget.available == 0 {
            return None;
        }
        Tier::ALL
            .into_iter()
            .filter(|&tier| self.has_slot(tier))
            .find_map(|tier| self.queues.get(tier).front())
            .and_then(|id| self.entries.get(id))
            .map(|entry| Arc::clone(&entry.request))
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
        self.queues.get_mut(tier).retain(|queued| queued != id);
        self.stats.queued.decrement(tier);
        self.stats.processing.increment(tier);
        Ok(dispatch)
    }

    fn complete(&mut self, id: &RequestId) -> Result<QueuedEntry, SchedulerError> {
        let state = self
            .entries
            .get(id)
            .map(|e| e.state)
            .ok_or_else(|| SchedulerError::UnknownRequest(id.clone()))?;
        if state != EntryState::Processing {
            return Err(SchedulerError::InvalidTransition { id: id.clone(), state });
        }
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| SchedulerError::UnknownRequest(id.clone()))?;
        self.stats.processing.decrement(entry.tier());
        Ok(entry)
    }

    fn remove(&mut self, id: &RequestId) -> Option<Arc<Request>> {
        if self.entries.get(id)?.state != EntryState::Queued {
            return None;
        }
        let entry = self.entries.remove(id)?;
        let tier = entry.tier();
        self.queues.get_mut(tier).retain(|queued| queued != id);
        self.stats.queued.decrement(tier);
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
        let mut list: Vec<&QueuedEntry> = self.entries.values().collect();
        list.sort_by_key(|e| (e.state == EntryState::Processing, e.sequence));
        list.into_iter().map(|e| e.snapshot(now, None)).collect()
    }

    /// Static limits, independent of the dynamic budget.
    fn allocation(&self, _max_concurrent: usize) -> PerTier<usize> {
        self.limits
    }

    fn can_dispatch_now(&self, tier: Tier, budget: &CapacityBudget) -> bool {
        budget.available > 0 && self.has_slot(tier)
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::FixedConcurrency
    }
}
