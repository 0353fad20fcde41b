//! Backend executor capability and the simulated/real routing layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::BackendError;
use crate::request::{prompt_text, ExecutionOverrides, Payload};

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Successful backend result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub content: String,
    pub usage: UsageStats,
    /// True when produced by the simulator.
    pub simulated: bool,
}

/// Executes one unit of work. Must tolerate concurrent calls.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    async fn execute(
        &self,
        payload: &Payload,
        overrides: ExecutionOverrides,
    ) -> Result<ExecutionOutput, BackendError>;
}

/// Global execution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Simulated,
    Real,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulator" | "sim" => Ok(Self::Simulated),
            "real" => Ok(Self::Real),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

impl ExecutionMode {
    /// Whether a request with `overrides` runs against the simulator.
    pub fn use_simulator(self, overrides: ExecutionOverrides) -> bool {
        overrides.force_simulated || (!overrides.force_real && self == Self::Simulated)
    }
}

/// Simulator behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Probability in [0, 1] that a call fails.
    pub failure_rate: f64,
    pub completion_tokens: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: 200,
            max_latency_ms: 800,
            failure_rate: 0.0,
            completion_tokens: 32,
        }
    }
}

/// ~4 bytes per token for English text.
const BYTES_PER_TOKEN_ESTIMATE: usize = 4;

/// Backend stand-in with configurable latency and failure injection.
pub struct SimulatedExecutor {
    config: SimulatorConfig,
}

impl SimulatedExecutor {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    fn draw(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let lo = self.config.min_latency_ms.min(self.config.max_latency_ms);
        let hi = self.config.max_latency_ms.max(lo);
        let latency = Duration::from_millis(rng.gen_range(lo..=hi));
        let fails = rng.gen_bool(self.config.failure_rate.clamp(0.0, 1.0));
        (latency, fails)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

#[async_trait]
impl BackendExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        payload: &Payload,
        _overrides: ExecutionOverrides,
    ) -> Result<ExecutionOutput, BackendError> {
        let (latency, fails) = self.draw();
        tokio::time::sleep(latency).await;
        if fails {
            return Err(BackendError::Failed("simulated backend failure".to_string()));
        }

        let prompt = prompt_text(payload).unwrap_or_default();
        let usage = estimate_usage(prompt.len(), self.config.completion_tokens);
        Ok(ExecutionOutput {
            content: format!("Simulated response ({} prompt tokens)", usage.prompt_tokens),
            usage,
            simulated: true,
        })
    }
}

/// Token usage for a prompt of `prompt_bytes`, saturating at `u32::MAX`.
fn estimate_usage(prompt_bytes: usize, completion_tokens: u32) -> UsageStats {
    let prompt_tokens =
        u32::try_from((prompt_bytes / BYTES_PER_TOKEN_ESTIMATE).max(1)).unwrap_or(u32::MAX);
    UsageStats {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
    }
}

/// Picks the simulator or the real backend per request.
pub struct ExecutionRouter {
    mode: ExecutionMode,
    simulated: Arc<dyn BackendExecutor>,
    real: Option<Arc<dyn BackendExecutor>>,
}

impl ExecutionRouter {
    pub fn new(mode: ExecutionMode, simulated: Arc<dyn BackendExecutor>) -> Self {
        Self { mode, simulated, real: None }
    }

    pub fn with_real(mut self, real: Arc<dyn BackendExecutor>) -> Self {
        self.real = Some(real);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

#[async_trait]
impl BackendExecutor for ExecutionRouter {
    async fn execute(
        &self,
        payload: &Payload,
        overrides: ExecutionOverrides,
    ) -> Result<ExecutionOutput, BackendError> {
        if self.mode.use_simulator(overrides) {
            return self.simulated.execute(payload, overrides).await;
        }
        match &self.real {
            Some(real) => real.execute(payload, overrides).await,
            None => Err(BackendError::Unavailable("no real backend configured".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait]
    impl BackendExecutor for Fixed {
        async fn execute(
            &self,
            _payload: &Payload,
            _overrides: ExecutionOverrides,
        ) -> Result<ExecutionOutput, BackendError> {
            Ok(ExecutionOutput {
                content: self.0.to_string(),
                usage: UsageStats::default(),
                simulated: false,
            })
        }
    }

    fn instant_simulator(failure_rate: f64) -> SimulatedExecutor {
        SimulatedExecutor::new(SimulatorConfig {
            min_latency_ms: 0,
            max_latency_ms: 0,
            failure_rate,
            completion_tokens: 8,
        })
    }

    #[test]
    fn usage_estimate_saturates() {
        let small = estimate_usage(0, 8);
        assert_eq!((small.prompt_tokens, small.total_tokens), (1, 9));

        let huge = estimate_usage(usize::MAX, u32::MAX);
        assert_eq!(huge.prompt_tokens, u32::try_from(usize::MAX / 4).unwrap_or(u32::MAX));
        assert_eq!(huge.total_tokens, u32::MAX);
    }

    #[test]
    fn overrides_take_precedence_over_mode() {
        let sim = ExecutionOverrides { force_simulated: true, force_real: false };
        let real = ExecutionOverrides { force_simulated: false, force_real: true };
        let both = ExecutionOverrides { force_simulated: true, force_real: true };
        let none = ExecutionOverrides::default();

        assert!(ExecutionMode::Real.use_simulator(sim));
        assert!(!ExecutionMode::Simulated.use_simulator(real));
        assert!(ExecutionMode::Real.use_simulator(both));
        assert!(ExecutionMode::Simulated.use_simulator(none));
        assert!(!ExecutionMode::Real.use_simulator(none));
    }

    #[tokio::test]
    async fn simulator_reports_usage() {
        let out = instant_simulator(0.0)
            .execute(&json!({"prompt": "twelve bytes"}), ExecutionOverrides::default())
            .await
            .unwrap();
        assert!(out.simulated);
        assert_eq!(out.usage.prompt_tokens, 3);
        assert_eq!(out.usage.total_tokens, 11);
    }

    #[tokio::test]
    async fn simulator_failure_rate_one_always_fails() {
        let err = instant_simulator(1.0)
            .execute(&json!("x"), ExecutionOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Failed(_)));
    }

    #[tokio::test]
    async fn router_dispatches_by_mode_and_overrides() {
        let router = ExecutionRouter::new(ExecutionMode::Simulated, Arc::new(instant_simulator(0.0)))
            .with_real(Arc::new(Fixed("real")));

        let out = router.execute(&json!("p"), ExecutionOverrides::default()).await.unwrap();
        assert!(out.simulated);

        let forced = ExecutionOverrides { force_real: true, ..Default::default() };
        let out = router.execute(&json!("p"), forced).await.unwrap();
        assert_eq!(out.content, "real");
    }

    #[tokio::test]
    async fn router_without_real_backend_is_unavailable() {
        let router = ExecutionRouter::new(ExecutionMode::Real, Arc::new(instant_simulator(0.0)));
        let err = router.execute(&json!("p"), ExecutionOverrides::default()).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }
}
