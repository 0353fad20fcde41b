//! Config CLI subcommands: show, defaults, validate.

use super::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_OK};
use crate::config::{self, EffectiveConfig, GatewayConfig};
use crate::tier::Tier;

/// Print effective config as key-value pairs to stdout.
pub fn run_show() -> i32 {
    match config::load() {
        Ok(cfg) => {
            print_config(&cfg.effective_config());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            EXIT_CONFIG_ERROR
        }
    }
}

/// Print built-in defaults, ignoring the environment.
pub fn run_defaults() -> i32 {
    print_config(&GatewayConfig::default().effective_config());
    EXIT_OK
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if loading failed.
pub fn run_validate() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };
    let warnings = validate(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {w}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

/// Semantic checks that loading cannot clamp away.
pub fn validate(cfg: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let adm = &cfg.admission;

    if !adm.capacity.is_monotonic() {
        warnings.push("capacity thresholds grant more slots to slower latency bands".to_string());
    }

    let weights = &adm.scheduler.policy.weight;
    if weights.total() > 1.0 + f64::EPSILON {
        warnings.push(format!("tier weights sum to {:.2}, above 1.0", weights.total()));
    }

    let base = &adm.scheduler.policy.base_priority;
    if !(base.get(Tier::Enterprise) > base.get(Tier::Premium) && base.get(Tier::Premium) > base.get(Tier::Free)) {
        warnings.push("base priorities are not strictly ordered enterprise > premium > free".to_string());
    }
    let max_bonus = adm.scheduler.aging_cap_secs as f64;
    if base.get(Tier::Free) + max_bonus > *base.get(Tier::Enterprise) {
        warnings.push(format!(
            "aging cap {}s lets a free request outrank a fresh enterprise request",
            adm.scheduler.aging_cap_secs
        ));
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    let scheduler = serde_json::to_value(cfg.scheduler).unwrap_or_default();
    let mode = serde_json::to_value(cfg.execution_mode).unwrap_or_default();
    let log_format = serde_json::to_value(cfg.log_format).unwrap_or_default();
    println!("TIERGATE_SCHEDULER={}", scheduler.as_str().unwrap_or_default());
    println!("TIERGATE_AGING_CAP_SECS={}", cfg.aging_cap_secs);
    println!("TIERGATE_DECISION_WINDOW_SECS={}", cfg.decision_window_secs);
    println!("TIERGATE_RETENTION_SECS={}", cfg.retention_secs);
    println!("TIERGATE_MAX_SAMPLES={}", cfg.max_samples);
    println!("TIERGATE_BREAKER_TRIP={}", cfg.breaker_trip);
    println!("TIERGATE_BREAKER_TIMEOUT_SECS={}", cfg.breaker_timeout_secs);
    println!("TIERGATE_BREAKER_SUCCESSES={}", cfg.breaker_successes);
    println!("TIERGATE_EXECUTION_MODE={}", mode.as_str().unwrap_or_default());
    println!("TIERGATE_SIM_MIN_LATENCY_MS={}", cfg.sim_min_latency_ms);
    println!("TIERGATE_SIM_MAX_LATENCY_MS={}", cfg.sim_max_latency_ms);
    println!("TIERGATE_SIM_FAILURE_RATE={}", cfg.sim_failure_rate);
    println!("TIERGATE_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    println!("TIERGATE_EVENT_BUFFER={}", cfg.event_buffer);
    println!("TIERGATE_LOG_FORMAT={}", log_format.as_str().unwrap_or_default());
    println!("TIERGATE_LOG_LEVEL={}", cfg.log_level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_passes_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert_eq!(run_validate(), EXIT_OK, "default config should pass validation");
    }

    #[test]
    fn test_validate_flags_long_aging_cap() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TIERGATE_AGING_CAP_SECS", "25");
        assert_eq!(run_validate(), EXIT_FAILURE);
        clear_env_vars();
    }

    #[test]
    fn test_validate_flags_bad_policy() {
        let mut cfg = GatewayConfig::default();
        cfg.admission.scheduler.policy.weight.free = 0.5;
        cfg.admission.scheduler.policy.base_priority.premium = 40.0;
        let warnings = validate(&cfg);
        assert_eq!(warnings.len(), 2, "{warnings:?}");
    }

    #[test]
    fn test_show_reports_load_errors() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(config::CONFIG_PATH_VAR, "/nonexistent/tiergate.toml");
        assert_eq!(run_show(), EXIT_CONFIG_ERROR);
        clear_env_vars();
    }

    #[test]
    fn test_defaults_prints() {
        assert_eq!(run_defaults(), EXIT_OK);
    }
}
