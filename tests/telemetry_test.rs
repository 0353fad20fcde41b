//! Telemetry module tests.

use std::path::PathBuf;
use std::time::Duration;

use tiergate::breaker::BreakerState;
use tiergate::request::RequestId;
use tiergate::telemetry::{
    record_admission, record_backend_latency, record_breaker_state, record_completion,
    record_max_concurrent, record_queue_depth, record_rejection, LogConfig, LogError, LogFormat,
    RequestSpan, SpanExt,
};
use tiergate::tier::Tier;
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_deserializes_from_toml() {
    let config: LogConfig = toml::from_str(
        r#"
format = "pretty"
level = "tiergate::admission=debug"
output_path = "/tmp/tiergate.log"
"#,
    )
    .unwrap();
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.level, "tiergate::admission=debug");
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/tiergate.log")));
}

#[test]
fn log_format_parses_aliases() {
    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert!(matches!("xml".parse::<LogFormat>(), Err(LogError::InvalidFormat(_))));
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));
    assert!(error.to_string().contains("bad filter"));
    assert!(LogError::AlreadyInitialized.to_string().contains("already initialized"));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_records_results_on_disabled_span() {
    let span = Span::none();
    span.record_result(&Ok::<u32, &str>(1));
    span.record_result(&Err::<u32, &str>("backend failed"));
}

#[test]
fn request_span_accepts_progress_fields() {
    let id = RequestId::from("req-123");
    let span = RequestSpan::new(&id, Tier::Premium);
    let _guard = span.enter();
    span.record("dispatch_path", "queued");
    span.record("waited_ms", 1200u64);
    span.record("latency_ms", 340u64);
    span.record_result(&Ok::<(), String>(()));
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn metrics_facade_without_recorder_is_noop() {
    for tier in Tier::ALL {
        record_admission(tier, "immediate");
        record_admission(tier, "queued");
        record_rejection(tier, "circuit_breaker");
        record_completion(tier, true, Duration::from_millis(10));
        record_completion(tier, false, Duration::ZERO);
        record_backend_latency(tier, Duration::from_secs(3));
        record_queue_depth(tier, 0);
    }
    record_max_concurrent(6);
    for state in [BreakerState::Closed, BreakerState::Open, BreakerState::HalfOpen] {
        record_breaker_state(state);
    }
}
