//! Integration tests for switching between the live link and the demo
//!
//! These drive a `Monitor` over the `MockRower` transport and verify that
//! sources stay mutually exclusive and that every failure path settles in a
//! stable state.

use rowing_daq::hardware::mock::{MockRower, UnavailableTransport};
use rowing_daq::protocol::{FrameBuilder, Metric};
use rowing_daq::{ConnectionState, Monitor, MonitorUpdate, RowError};
use std::sync::Arc;
use std::time::Duration;

fn frame(distance: f64) -> rowing_daq::protocol::RawFrame {
    FrameBuilder::new()
        .field(Metric::StrokeRate, 26.0)
        .field(Metric::StrokeCount, 40.0)
        .field(Metric::TotalDistance, distance)
        .build()
}

async fn connected_monitor(rower: &MockRower) -> Monitor {
    let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));
    monitor.connect().await.unwrap();
    assert_eq!(
        monitor.next_update().await,
        Some(MonitorUpdate::State(ConnectionState::Connected))
    );
    monitor
}

// =============================================================================
// Live link -> Demo
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_demo_releases_live_link_before_first_tick() {
    let rower = MockRower::new();
    let mut monitor = connected_monitor(&rower).await;

    rower.emit(frame(900.0));
    monitor.next_update().await;
    assert_eq!(monitor.snapshot().get(Metric::TotalDistance), Some(900.0));

    // Queued but unprocessed frame from the link.
    rower.emit(frame(950.0));
    monitor.start_demo().await;

    assert_eq!(monitor.state(), ConnectionState::Demo);
    assert!(!rower.is_notifying());
    assert_eq!(rower.stop_count(), 1);
    assert_eq!(rower.close_count(), 1);
    assert!(!rower.emit(frame(1000.0)));

    // The very next update is synthetic; nothing from the link follows.
    for tick in 1..=3 {
        match monitor.next_update().await {
            Some(MonitorUpdate::Metrics { fields, .. }) => {
                assert_eq!(fields.get(Metric::ElapsedTime), Some(f64::from(tick)));
                assert!(fields.get(Metric::TotalDistance).unwrap() < 20.0);
            }
            other => panic!("unexpected update {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_demo_abandons_slow_connect() {
    let rower = MockRower::new().with_connect_delay(Duration::from_secs(3));
    let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));

    monitor.connect().await.unwrap();
    assert_eq!(monitor.state(), ConnectionState::Connecting);
    monitor.start_demo().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    let updates = monitor.poll().await;
    assert!(!updates.is_empty());
    assert!(updates
        .iter()
        .all(|update| matches!(update, MonitorUpdate::Metrics { .. })));
    assert_eq!(monitor.state(), ConnectionState::Demo);
    assert!(!rower.is_notifying());
}

// =============================================================================
// Demo -> Live link
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_stops_demo() {
    let rower = MockRower::new();
    let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));
    monitor.start_demo().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    monitor.connect().await.unwrap();
    assert_eq!(
        monitor.next_update().await,
        Some(MonitorUpdate::State(ConnectionState::Connected))
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(monitor.poll().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_capability_leaves_demo_running() {
    let mut monitor = Monitor::with_defaults(Arc::new(UnavailableTransport));
    monitor.start_demo().await;

    let err = monitor.connect().await.unwrap_err();
    assert!(matches!(err, RowError::CapabilityUnavailable(_)));
    assert_eq!(monitor.state(), ConnectionState::Demo);
    assert!(monitor.last_error().is_some());

    assert!(matches!(
        monitor.next_update().await,
        Some(MonitorUpdate::Metrics { .. })
    ));
}

// =============================================================================
// Failure paths
// =============================================================================

#[tokio::test]
async fn test_unavailable_capability_from_disconnected() {
    let mut monitor = Monitor::with_defaults(Arc::new(MockRower::unavailable()));
    assert!(monitor.connect().await.is_err());
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
    assert_eq!(
        monitor.last_error(),
        Some("Bluetooth is not available on this host.")
    );
}

#[tokio::test]
async fn test_link_drop_keeps_snapshot() {
    let rower = MockRower::new();
    let mut monitor = connected_monitor(&rower).await;
    rower.emit(frame(300.0));
    monitor.next_update().await;

    rower.drop_link("device powered off").await;
    assert_eq!(
        monitor.next_update().await,
        Some(MonitorUpdate::State(ConnectionState::Disconnected))
    );
    assert_eq!(rower.close_count(), 1);
    assert_eq!(monitor.snapshot().get(Metric::TotalDistance), Some(300.0));

    // Reconnecting works after a drop.
    monitor.connect().await.unwrap();
    assert_eq!(
        monitor.next_update().await,
        Some(MonitorUpdate::State(ConnectionState::Connected))
    );
    assert_eq!(rower.connect_count(), 2);
}

#[tokio::test]
async fn test_teardown_errors_never_surface() {
    let rower = MockRower::new().with_teardown_failure();
    let mut monitor = connected_monitor(&rower).await;

    monitor.disconnect().await;
    monitor.disconnect().await;
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
    assert_eq!(monitor.last_error(), None);
}

#[tokio::test]
async fn test_failed_attempt_then_retry_clears_error() {
    let failing = MockRower::failing("Device not found");
    let mut monitor = Monitor::with_defaults(Arc::new(failing));
    monitor.connect().await.unwrap();
    monitor.next_update().await;
    assert_eq!(monitor.last_error(), Some("Device not found"));

    // A new user action clears the message.
    monitor.start_demo().await;
    assert_eq!(monitor.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_drop_mid_handshake_reports_failure() {
    let rower = MockRower::new()
        .with_handshake_drop("gatt server disconnected")
        .with_connect_delay(Duration::from_secs(30));
    let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));
    monitor.connect().await.unwrap();

    assert_eq!(
        monitor.next_update().await,
        Some(MonitorUpdate::State(ConnectionState::Disconnected))
    );
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
    assert_eq!(monitor.last_error(), Some("gatt server disconnected"));
}

#[tokio::test(start_paused = true)]
async fn test_half_open_link_released_on_timeout_and_on_demo() {
    // Timed out while subscribing.
    let rower = MockRower::new().with_notification_delay(Duration::from_secs(60));
    let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));
    monitor.connect().await.unwrap();
    assert_eq!(
        monitor.next_update().await,
        Some(MonitorUpdate::State(ConnectionState::Disconnected))
    );
    assert!(monitor.last_error().unwrap().contains("Timed out"));
    assert_eq!(rower.close_count(), 1);

    // Abandoned for the demo while subscribing.
    let rower = MockRower::new().with_notification_delay(Duration::from_secs(60));
    let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));
    monitor.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    monitor.start_demo().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(rower.close_count(), 1);
    assert_eq!(monitor.state(), ConnectionState::Demo);
}
