//! Priority scoring with capped aging.

use std::cmp::Ordering;
use std::time::Duration;

use crate::tier::{Tier, TierPolicy};

/// `base_priority(tier) + min(age_secs, cap_secs)`.
///
/// Non-decreasing in `age` for a fixed tier.
pub fn priority_score(policy: &TierPolicy, tier: Tier, age: Duration, aging_cap: Duration) -> f64 {
    policy.base_priority.get(tier) + age.min(aging_cap).as_secs_f64()
}

/// A queued entry ranked for selection.
///
/// Higher score wins; equal scores go to the earlier enqueue.
#[derive(Debug)]
pub struct Candidate<'a, T> {
    pub score: f64,
    pub sequence: u64,
    pub item: &'a T,
}

impl<T> Clone for Candidate<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Candidate<'_, T> {}

impl<T> PartialEq for Candidate<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Candidate<'_, T> {}

impl<T> PartialOrd for Candidate<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Candidate<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.score.total_cmp(&other.score) {
            Ordering::Equal => other.sequence.cmp(&self.sequence), // Lower sequence = earlier
            ord => ord,
        }
    }
}
