//! Configuration loading: defaults, then an optional TOML file, then
//! environment overrides.
//!
//! Invalid environment values fall back to the current value and every
//! numeric setting is clamped to a sane floor, so loading never panics.
//! Only an unreadable or malformed TOML file is an error.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TIERGATE_CONFIG` | unset | Path to a TOML config file |
//! | `TIERGATE_SCHEDULER` | work_conserving | `work_conserving` or `fixed_concurrency` |
//! | `TIERGATE_AGING_CAP_SECS` | 20 | Max aging bonus (seconds of wait) |
//! | `TIERGATE_DECISION_WINDOW_SECS` | 60 | Window feeding the concurrency decision |
//! | `TIERGATE_RETENTION_SECS` | 300 | Sample retention |
//! | `TIERGATE_MAX_SAMPLES` | 1000 | Hard cap on retained samples |
//! | `TIERGATE_BREAKER_TRIP` | 5 | Summed failures that open the breaker |
//! | `TIERGATE_BREAKER_TIMEOUT_SECS` | 30 | Open duration before probing |
//! | `TIERGATE_BREAKER_SUCCESSES` | 3 | Probe successes needed to close |
//! | `TIERGATE_EXECUTION_MODE` | simulated | `simulated` or `real` |
//! | `TIERGATE_SIM_MIN_LATENCY_MS` | 200 | Simulator latency lower bound |
//! | `TIERGATE_SIM_MAX_LATENCY_MS` | 800 | Simulator latency upper bound |
//! | `TIERGATE_SIM_FAILURE_RATE` | 0.0 | Simulator failure probability |
//! | `TIERGATE_SHUTDOWN_TIMEOUT` | 30 | Drain timeout (secs) |
//! | `TIERGATE_EVENT_BUFFER` | 256 | Observer channel capacity |
//! | `TIERGATE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `TIERGATE_LOG_LEVEL` | info | Tracing filter directive |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::{AdmissionConfig, ExecutionMode, SimulatorConfig};
use crate::scheduler::SchedulerKind;
use crate::telemetry::{LogConfig, LogFormat};

pub const CONFIG_PATH_VAR: &str = "TIERGATE_CONFIG";

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Backend execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub simulator: SimulatorConfig,
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub admission: AdmissionConfig,
    pub execution: ExecutionConfig,
    pub logging: LogConfig,
    pub shutdown_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LogConfig::default(),
            shutdown_timeout_secs: 30,
        }
    }
}

/// Flat summary of the effective values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub scheduler: SchedulerKind,
    pub aging_cap_secs: u64,
    pub decision_window_secs: u64,
    pub retention_secs: u64,
    pub max_samples: usize,
    pub breaker_trip: u32,
    pub breaker_timeout_secs: u64,
    pub breaker_successes: u32,
    pub execution_mode: ExecutionMode,
    pub sim_min_latency_ms: u64,
    pub sim_max_latency_ms: u64,
    pub sim_failure_rate: f64,
    pub shutdown_timeout_secs: u64,
    pub event_buffer: usize,
    pub log_format: LogFormat,
    pub log_level: String,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    parse_or(key, default)
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    parse_or(key, default)
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    parse_or(key, default)
}

/// Parse a finite `f64` env var, returning `default` otherwise.
fn parse_f64(key: &str, default: f64) -> f64 {
    let value = parse_or(key, default);
    if value.is_finite() {
        value
    } else {
        default
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key, value = %val, "ignoring invalid config value");
            default
        }),
        Err(_) => default,
    }
}

/// Load configuration from `TIERGATE_CONFIG` (if set) and the environment.
pub fn load() -> Result<GatewayConfig, ConfigError> {
    let mut config = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.trim().is_empty() => load_file(Path::new(path.trim()))?,
        _ => GatewayConfig::default(),
    };
    config.apply_env();
    config.sanitize();
    Ok(config)
}

/// Parse a TOML config file. Missing keys take their defaults.
pub fn load_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl GatewayConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Overlay `TIERGATE_*` environment variables.
    pub fn apply_env(&mut self) {
        let adm = &mut self.admission;
        adm.scheduler.kind = parse_or("TIERGATE_SCHEDULER", adm.scheduler.kind);
        adm.scheduler.aging_cap_secs = parse_u64("TIERGATE_AGING_CAP_SECS", adm.scheduler.aging_cap_secs);
        adm.capacity.decision_window_secs =
            parse_u64("TIERGATE_DECISION_WINDOW_SECS", adm.capacity.decision_window_secs);
        adm.capacity.retention_secs = parse_u64("TIERGATE_RETENTION_SECS", adm.capacity.retention_secs);
        adm.capacity.max_samples = parse_usize("TIERGATE_MAX_SAMPLES", adm.capacity.max_samples);
        adm.breaker.trip_threshold = parse_u32("TIERGATE_BREAKER_TRIP", adm.breaker.trip_threshold);
        adm.breaker.open_timeout_secs =
            parse_u64("TIERGATE_BREAKER_TIMEOUT_SECS", adm.breaker.open_timeout_secs);
        adm.breaker.success_threshold =
            parse_u32("TIERGATE_BREAKER_SUCCESSES", adm.breaker.success_threshold);
        adm.event_buffer = parse_usize("TIERGATE_EVENT_BUFFER", adm.event_buffer);

        let exec = &mut self.execution;
        exec.mode = parse_or("TIERGATE_EXECUTION_MODE", exec.mode);
        exec.simulator.min_latency_ms = parse_u64("TIERGATE_SIM_MIN_LATENCY_MS", exec.simulator.min_latency_ms);
        exec.simulator.max_latency_ms = parse_u64("TIERGATE_SIM_MAX_LATENCY_MS", exec.simulator.max_latency_ms);
        exec.simulator.failure_rate = parse_f64("TIERGATE_SIM_FAILURE_RATE", exec.simulator.failure_rate);

        self.shutdown_timeout_secs = parse_u64("TIERGATE_SHUTDOWN_TIMEOUT", self.shutdown_timeout_secs);
        self.logging.format = parse_or("TIERGATE_LOG_FORMAT", self.logging.format);
        if let Ok(level) = std::env::var("TIERGATE_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }
    }

    /// Clamp values to usable floors.
    pub fn sanitize(&mut self) {
        let adm = &mut self.admission;
        adm.scheduler.aging_cap_secs = adm.scheduler.aging_cap_secs.max(1);
        adm.scheduler.fixed_limits = adm.scheduler.fixed_limits.map(|_, l| (*l).max(1));
        adm.capacity.decision_window_secs = adm.capacity.decision_window_secs.max(1);
        adm.capacity.retention_secs = adm.capacity.retention_secs.max(adm.capacity.decision_window_secs);
        adm.capacity.max_samples = adm.capacity.max_samples.max(1);
        adm.capacity.fallback_concurrency = adm.capacity.fallback_concurrency.max(1);
        adm.breaker.trip_threshold = adm.breaker.trip_threshold.max(1);
        adm.breaker.open_timeout_secs = adm.breaker.open_timeout_secs.max(1);
        adm.breaker.success_threshold = adm.breaker.success_threshold.max(1);
        adm.event_buffer = adm.event_buffer.max(1);
        adm.stats_retention_secs = adm.stats_retention_secs.max(60);

        let sim = &mut self.execution.simulator;
        sim.failure_rate = sim.failure_rate.clamp(0.0, 1.0);
        sim.max_latency_ms = sim.max_latency_ms.max(sim.min_latency_ms);

        self.shutdown_timeout_secs = self.shutdown_timeout_secs.max(1);
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let adm = &self.admission;
        let sim = &self.execution.simulator;
        EffectiveConfig {
            scheduler: adm.scheduler.kind,
            aging_cap_secs: adm.scheduler.aging_cap_secs,
            decision_window_secs: adm.capacity.decision_window_secs,
            retention_secs: adm.capacity.retention_secs,
            max_samples: adm.capacity.max_samples,
            breaker_trip: adm.breaker.trip_threshold,
            breaker_timeout_secs: adm.breaker.open_timeout_secs,
            breaker_successes: adm.breaker.success_threshold,
            execution_mode: self.execution.mode,
            sim_min_latency_ms: sim.min_latency_ms,
            sim_max_latency_ms: sim.max_latency_ms,
            sim_failure_rate: sim.failure_rate,
            shutdown_timeout_secs: self.shutdown_timeout_secs,
            event_buffer: adm.event_buffer,
            log_format: self.logging.format,
            log_level: self.logging.level.clone(),
        }
    }
}
