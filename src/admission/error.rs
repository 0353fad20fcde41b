//! Admission and backend error types.
//!
//! Breaker rejections and backend failures are distinct variants so a
//! transport layer can map them to different status codes.

use thiserror::Error;

use crate::breaker::BreakerState;
use crate::request::RequestId;
use crate::scheduler::SchedulerError;
use crate::tier::Tier;

/// Failure raised by a backend executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend call failed: {0}")]
    Failed(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Per-request admission outcome error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdmissionError {
    #[error("circuit breaker {state} rejected {tier} request (error rate {error_rate:.3})")]
    CircuitBreakerOpen {
        tier: Tier,
        state: BreakerState,
        error_rate: f64,
    },

    #[error("request {id} ({tier}) failed: {source}")]
    Backend {
        id: RequestId,
        tier: Tier,
        #[source]
        source: BackendError,
    },

    #[error("request {0} was cancelled before dispatch")]
    Cancelled(RequestId),

    #[error("admission is draining; not accepting new requests")]
    ShuttingDown,

    #[error("request id {0} is already in flight")]
    DuplicateRequest(RequestId),

    #[error("internal scheduling error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// True when the request never reached the backend.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CircuitBreakerOpen { .. } | Self::ShuttingDown | Self::DuplicateRequest(_)
        )
    }

    /// True when the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CircuitBreakerOpen { .. }
                | Self::ShuttingDown
                | Self::Backend { source: BackendError::Unavailable(_), .. }
        )
    }

    /// Suggested HTTP status for a transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::CircuitBreakerOpen { .. } | Self::ShuttingDown => 503,
            Self::Backend { source: BackendError::InvalidPayload(_), .. } => 400,
            Self::Backend { .. } => 502,
            Self::DuplicateRequest(_) => 409,
            Self::Cancelled(_) => 499,
            Self::Internal(_) => 500,
        }
    }
}

impl From<SchedulerError> for AdmissionError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::DuplicateRequest(id) => Self::DuplicateRequest(id),
            other => Self::Internal(other.to_string()),
        }
    }
}
