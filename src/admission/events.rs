//! Observer events published by the admission controller.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::breaker::BreakerState;
use crate::request::RequestId;
use crate::tier::Tier;

/// How a request reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPath {
    /// Slots were free at submission; never queued.
    Immediate,
    /// Waited in the scheduler first.
    Queued,
}

impl DispatchPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Queued => "queued",
        }
    }
}

/// Lifecycle notification for external listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdmissionEvent {
    Admitted {
        id: RequestId,
        tier: Tier,
        path: DispatchPath,
    },
    Dispatched {
        id: RequestId,
        tier: Tier,
        waited_ms: u64,
    },
    Completed {
        id: RequestId,
        tier: Tier,
        success: bool,
        processing_ms: u64,
    },
    Rejected {
        id: RequestId,
        tier: Tier,
        reason: String,
    },
    Cancelled {
        id: RequestId,
        tier: Tier,
    },
    BreakerTransition {
        from: BreakerState,
        to: BreakerState,
    },
}

/// Fan-out channel. Publishing never blocks; slow receivers lag.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AdmissionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: AdmissionEvent) {
        // No receivers is the common case.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdmissionEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_receivers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(AdmissionEvent::Cancelled { id: "x".into(), tier: Tier::Free });
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn lagging_receiver_skips_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..3 {
            bus.publish(AdmissionEvent::Cancelled { id: format!("r{i}").into(), tier: Tier::Free });
        }
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(1))));
        assert!(matches!(rx.recv().await, Ok(AdmissionEvent::Cancelled { id, .. }) if id.as_str() == "r1"));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(AdmissionEvent::Admitted {
            id: "a".into(),
            tier: Tier::Premium,
            path: DispatchPath::Queued,
        })
        .unwrap();
        assert_eq!(json["event"], "admitted");
        assert_eq!(json["tier"], "premium");
        assert_eq!(json["path"], "queued");
    }
}
