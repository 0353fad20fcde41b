//! `metrics` facade recording.
//!
//! Names are prefixed `tiergate_`; tier and outcome are labels.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::breaker::BreakerState;
use crate::tier::Tier;

/// A request admitted on the immediate or queued path.
pub fn record_admission(tier: Tier, path: &'static str) {
    counter!("tiergate_admissions_total", "tier" => tier.as_str(), "path" => path).increment(1);
}

pub fn record_rejection(tier: Tier, reason: &'static str) {
    counter!("tiergate_rejections_total", "tier" => tier.as_str(), "reason" => reason).increment(1);
}

pub fn record_completion(tier: Tier, success: bool, waited: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("tiergate_completions_total", "tier" => tier.as_str(), "outcome" => outcome)
        .increment(1);
    histogram!("tiergate_queue_wait_seconds", "tier" => tier.as_str()).record(waited.as_secs_f64());
}

pub fn record_backend_latency(tier: Tier, latency: Duration) {
    histogram!("tiergate_backend_latency_seconds", "tier" => tier.as_str())
        .record(latency.as_secs_f64());
}

pub fn record_queue_depth(tier: Tier, depth: usize) {
    gauge!("tiergate_queue_depth", "tier" => tier.as_str()).set(depth as f64);
}

pub fn record_max_concurrent(max_concurrent: usize) {
    gauge!("tiergate_max_concurrent").set(max_concurrent as f64);
}

/// 0 = closed, 1 = half-open, 2 = open.
pub fn record_breaker_state(state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    gauge!("tiergate_breaker_state").set(value);
}
