//! Telemetry for the admission core.
//!
//! Structured logging, per-request spans, and `metrics` facade recording.
//! No exporter is installed here; the host process decides where metrics go.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_admission, record_backend_latency, record_breaker_state, record_completion,
    record_max_concurrent, record_queue_depth, record_rejection,
};
pub use spans::{RequestSpan, SpanExt};
