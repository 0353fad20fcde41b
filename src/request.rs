//! Admission request type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// Caller-supplied request identifier. Must be unique among in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-request overrides of the global execution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOverrides {
    pub force_simulated: bool,
    pub force_real: bool,
}

/// Opaque work content handed to the backend executor.
pub type Payload = serde_json::Value;

/// A unit of work submitted for scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub tier: Tier,
    pub payload: Payload,
    pub overrides: ExecutionOverrides,
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, tier: Tier, payload: Payload) -> Self {
        Self {
            id: id.into(),
            tier,
            payload,
            overrides: ExecutionOverrides::default(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_overrides(mut self, overrides: ExecutionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Prompt text, when the payload carries one.
    ///
    /// Accepts a bare string, `{"prompt": "..."}`, or chat-style
    /// `{"messages": [{"content": "..."}]}` (contents joined by newlines).
    pub fn prompt_text(&self) -> Option<String> {
        prompt_text(&self.payload)
    }
}

pub(crate) fn prompt_text(payload: &Payload) -> Option<String> {
    if let Some(s) = payload.as_str() {
        return Some(s.to_string());
    }
    if let Some(s) = payload.get("prompt").and_then(|p| p.as_str()) {
        return Some(s.to_string());
    }
    let messages = payload.get("messages")?.as_array()?;
    let parts: Vec<&str> = messages
        .iter()
        .filter_map(|m| m.get("content").and_then(|c| c.as_str()))
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}
