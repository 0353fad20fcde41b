//! Graceful shutdown coordination.
//!
//! Tracks every admitted request with an RAII guard. Draining stops new
//! admissions and waits for the tracked count to reach zero.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Coordinates draining of in-flight requests.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Check if accepting new requests.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track an in-flight request. Returns None once draining has begun.
    pub fn track(&self) -> Option<ShutdownGuard> {
        // Hold the read lock so a concurrent drain cannot miss this request.
        let state = self.state.read();
        if *state != ShutdownState::Running {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            counter: Arc::clone(&self.in_flight),
            notify: Arc::clone(&self.notify),
        })
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting and wait, without a deadline, for all guards to drop.
    pub async fn drain(&self) {
        self.begin_draining();
        self.wait_for_zero().await;
        self.set_state(ShutdownState::Stopped);
    }

    /// Stop accepting and wait up to `timeout` for all guards to drop.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        self.begin_draining();
        let result = self.wait_for_drain(timeout).await;
        self.set_state(ShutdownState::Stopped);
        result
    }

    fn begin_draining(&self) {
        let mut state = self.state.write();
        if *state == ShutdownState::Running {
            *state = ShutdownState::Draining;
            tracing::info!(in_flight = self.in_flight_count(), "draining admissions");
        }
    }

    fn set_state(&self, next: ShutdownState) {
        *self.state.write() = next;
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        match tokio::time::timeout(timeout, self.wait_for_zero()).await {
            Ok(()) => ShutdownResult::Complete,
            Err(_) => match self.in_flight_count() {
                0 => ShutdownResult::Complete,
                remaining => ShutdownResult::Timeout { remaining },
            },
        }
    }

    /// Resolves once no guards remain. Any number of callers may wait.
    async fn wait_for_zero(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before reading the count so a concurrent drop is not missed.
            notified.as_mut().enable();
            if self.in_flight_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight request tracking.
#[derive(Debug)]
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}
