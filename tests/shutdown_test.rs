//! Tests for graceful shutdown coordination.

use std::sync::Arc;
use std::time::Duration;

use tiergate::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use tokio_test::{assert_pending, assert_ready};

#[test]
fn test_initial_state_is_running() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state(), ShutdownState::Running);
    assert!(coordinator.is_accepting());
}

#[test]
fn test_guards_track_in_flight_count() {
    let coordinator = ShutdownCoordinator::new();

    let g1 = coordinator.track();
    let g2 = coordinator.track();
    assert!(g1.is_some() && g2.is_some());
    assert_eq!(coordinator.in_flight_count(), 2);

    drop(g1);
    assert_eq!(coordinator.in_flight_count(), 1);
    drop(g2);
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_track_returns_none_when_draining() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guard = coordinator.track().unwrap();
    let coord_clone = coordinator.clone();

    let handle = tokio::spawn(async move { coord_clone.initiate(Duration::from_secs(5)).await });

    // Brief delay for state transition
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(coordinator.state(), ShutdownState::Draining);
    assert!(!coordinator.is_accepting());
    assert!(coordinator.track().is_none());

    drop(guard);
    assert_eq!(handle.await.unwrap(), ShutdownResult::Complete);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_drain_completes_when_zero_requests() {
    let coordinator = ShutdownCoordinator::new();
    let result = coordinator.initiate(Duration::from_millis(100)).await;
    assert_eq!(result, ShutdownResult::Complete);
}

#[tokio::test]
async fn test_drain_timeout_returns_remaining() {
    let coordinator = ShutdownCoordinator::new();
    let _guard = coordinator.track().unwrap();

    let result = coordinator.initiate(Duration::from_millis(50)).await;
    assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_untimed_drain_waits_for_every_guard() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guards: Vec<_> = (0..3).filter_map(|_| coordinator.track()).collect();
    let coord_clone = coordinator.clone();

    let handle = tokio::spawn(async move { coord_clone.drain().await });

    for guard in guards {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!handle.is_finished());
        drop(guard);
    }
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("drain should finish once all guards drop")
        .unwrap();
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[test]
fn test_concurrent_drains_all_resolve() {
    let coordinator = ShutdownCoordinator::new();
    let guard = coordinator.track().unwrap();

    let mut first = tokio_test::task::spawn(coordinator.drain());
    let mut second = tokio_test::task::spawn(coordinator.drain());
    assert_pending!(first.poll());
    assert_pending!(second.poll());

    drop(guard);
    assert!(first.is_woken());
    assert!(second.is_woken());
    assert_ready!(first.poll());
    assert_ready!(second.poll());
    assert_eq!(coordinator.in_flight_count(), 0);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[test]
fn test_drain_stays_pending_until_last_guard() {
    let coordinator = ShutdownCoordinator::new();
    let g1 = coordinator.track().unwrap();
    let g2 = coordinator.track().unwrap();

    let mut drain = tokio_test::task::spawn(coordinator.drain());
    assert_pending!(drain.poll());
    drop(g1);
    assert_pending!(drain.poll());
    drop(g2);
    assert_ready!(drain.poll());
}
