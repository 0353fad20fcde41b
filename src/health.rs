//! Health reporting for the admission core.
//!
//! Combines shutdown state, breaker state and queue depth into a single
//! health verdict for host liveness and readiness probes.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerState;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_requests: bool,
    pub breaker: BreakerState,
    pub queue_depth: usize,
    pub processing: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Queue depth at or above which the core reports degraded.
    pub max_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { max_queue_depth: 1000 }
    }
}

/// Inputs sampled from the running controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthInputs {
    pub shutdown: ShutdownState,
    pub breaker: BreakerState,
    pub queue_depth: usize,
    pub processing: usize,
}

pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: accepting traffic with a usable backend.
    pub fn is_ready(&self, inputs: &HealthInputs) -> bool {
        inputs.shutdown == ShutdownState::Running
            && inputs.breaker != BreakerState::Open
            && inputs.queue_depth < self.config.max_queue_depth
    }

    pub fn report(&self, inputs: HealthInputs) -> HealthReport {
        HealthReport {
            state: self.compute_state(&inputs),
            ready: self.is_ready(&inputs),
            accepting_requests: inputs.shutdown == ShutdownState::Running,
            breaker: inputs.breaker,
            queue_depth: inputs.queue_depth,
            processing: inputs.processing,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, inputs: &HealthInputs) -> HealthState {
        if inputs.shutdown != ShutdownState::Running || inputs.breaker == BreakerState::Open {
            return HealthState::Unhealthy;
        }
        if inputs.breaker == BreakerState::HalfOpen || inputs.queue_depth >= self.config.max_queue_depth {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
