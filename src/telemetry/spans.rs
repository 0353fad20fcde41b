//! Per-request spans.

use tracing::{info_span, Span};

use crate::request::RequestId;
use crate::tier::Tier;

/// Extension trait for recording outcomes onto a span.
pub trait SpanExt {
    /// Fill `status` and, on error, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for admission request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Span covering one request from submission to completion.
    ///
    /// `dispatch_path`, `status`, `error.message`, `waited_ms` and
    /// `latency_ms` start empty and are recorded as the request progresses.
    pub fn new(request_id: &RequestId, tier: Tier) -> Span {
        info_span!(
            "admission_request",
            request_id = %request_id,
            tier = %tier,
            dispatch_path = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            waited_ms = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
