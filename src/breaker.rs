//! Global circuit breaker consulted with tier context.
//!
//! One breaker halts every tier during a systemic outage; tolerance for
//! transient errors is tier-differentiated through the error-rate check.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::capacity::CapacityBudget;
use crate::clock::{system_clock, SharedClock};
use crate::telemetry;
use crate::tier::{PerTier, Tier};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("CLOSED"),
            Self::Open => f.write_str("OPEN"),
            Self::HalfOpen => f.write_str("HALF_OPEN"),
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Summed failures across tiers that trip the breaker.
    pub trip_threshold: u32,
    /// Time since the last failure before an open breaker probes.
    pub open_timeout_secs: u64,
    /// Successes in HALF_OPEN needed to close.
    pub success_threshold: u32,
    /// Rolling error rate tolerated per tier.
    pub error_threshold: PerTier<f64>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip_threshold: 5,
            open_timeout_secs: 30,
            success_threshold: 3,
            error_threshold: PerTier::new(0.01, 0.05, 0.20),
        }
    }
}

impl BreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

/// A state change, returned so the caller can publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Read-only view of breaker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failures: PerTier<u32>,
    pub success_count: u32,
}

/// CLOSED / OPEN / HALF_OPEN failure gate.
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: SharedClock,
    state: BreakerState,
    failures: PerTier<u32>,
    success_count: u32,
    last_failure: Option<Instant>,
    pending: Vec<BreakerTransition>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            clock: system_clock(),
            state: BreakerState::Closed,
            failures: PerTier::default(),
            success_count: 0,
            last_failure: None,
            pending: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failures: self.failures,
            success_count: self.success_count,
        }
    }

    /// Whether a request of `tier` may be admitted under `budget`.
    ///
    /// An OPEN breaker whose timeout has elapsed moves to HALF_OPEN here.
    pub fn can_process(&mut self, tier: Tier, budget: &CapacityBudget) -> bool {
        if self.state == BreakerState::Open {
            let elapsed = self
                .last_failure
                .map(|at| self.clock.now().saturating_duration_since(at));
            match elapsed {
                Some(e) if e > self.config.open_timeout() => {
                    self.success_count = 0;
                    self.transition(BreakerState::HalfOpen);
                }
                Some(_) => return false,
                None => {
                    self.success_count = 0;
                    self.transition(BreakerState::HalfOpen);
                }
            }
        }
        budget.error_rate <= *self.config.error_threshold.get(tier)
    }

    pub fn record_success(&mut self) {
        if self.state != BreakerState::HalfOpen {
            return;
        }
        self.success_count += 1;
        if self.success_count >= self.config.success_threshold {
            self.failures = PerTier::default();
            self.success_count = 0;
            self.transition(BreakerState::Closed);
        }
    }

    pub fn record_failure(&mut self, tier: Tier) {
        *self.failures.get_mut(tier) += 1;
        self.last_failure = Some(self.clock.now());
        if self.state != BreakerState::Open && self.failures.total() >= self.config.trip_threshold {
            self.transition(BreakerState::Open);
        }
    }

    /// Transitions since the last call, oldest first.
    pub fn take_transitions(&mut self) -> Vec<BreakerTransition> {
        std::mem::take(&mut self.pending)
    }

    fn transition(&mut self, to: BreakerState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        match to {
            BreakerState::Open => tracing::warn!(
                %from,
                failures = self.failures.total(),
                "circuit breaker opened"
            ),
            BreakerState::HalfOpen => tracing::warn!(%from, "circuit breaker probing"),
            BreakerState::Closed => tracing::info!(%from, "circuit breaker closed"),
        }
        telemetry::record_breaker_state(to);
        self.pending.push(BreakerTransition { from, to });
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
