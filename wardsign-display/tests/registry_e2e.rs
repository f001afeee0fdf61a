//! Display agent against a stub registry over real HTTP

use std::time::Duration;
use wardsign_devkit::TestHarness;
use wardsign_display::fetch::{CsvSource, DataSource, RegistrySource, SnapshotFetcher};
use wardsign_display::heartbeat::{HeartbeatError, HttpHeartbeatSink, LivenessReporter, PulseStatus, Visibility};
use wardsign_display::model::{ContentMode, ViewId};

fn client() -> reqwest::Client {
    reqwest::Client::builder().timeout(Duration::from_secs(2)).build().unwrap()
}

fn reporter(url: &str, display_id: &str) -> LivenessReporter<HttpHeartbeatSink> {
    LivenessReporter::new(
        HttpHeartbeatSink::new(client(), url),
        display_id,
        Duration::from_secs(15),
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn test_visibility_and_teardown_reach_registry() {
    let harness = TestHarness::new("DISP-001").await.unwrap();
    let mut reporter = reporter(harness.url(), "DISP-001");

    reporter.start();
    reporter.set_visibility(Visibility::Hidden);
    reporter.set_visibility(Visibility::Hidden);
    reporter.set_visibility(Visibility::Visible);
    // queued pulses drain before the beacon
    reporter.teardown().await;

    harness.wait_for_heartbeats(4, 2000).await.unwrap();
    harness.assert_statuses("DISP-001", &["online", "offline", "online", "offline"]).unwrap();
}

#[tokio::test]
async fn test_three_failures_then_recovery() {
    let harness = TestHarness::new("DISP-001").await.unwrap();
    let mut reporter = reporter(harness.url(), "DISP-001");

    harness.registry.fail_next_heartbeats(3);
    for _ in 0..3 {
        assert!(!reporter.report_status(PulseStatus::Online).await);
    }
    assert_eq!(reporter.consecutive_failures(), 3);
    assert!(reporter.banner().is_some());

    assert!(reporter.report_status(PulseStatus::Online).await);
    assert!(reporter.banner().is_none());
    harness.assert_statuses("DISP-001", &["online"]).unwrap();
}

#[tokio::test]
async fn test_unknown_display_is_rejected() {
    use wardsign_display::heartbeat::{HeartbeatSink, Pulse};

    let harness = TestHarness::new("DISP-001").await.unwrap();
    let sink = HttpHeartbeatSink::new(client(), harness.url());
    let pulse = Pulse {
        display_id: "DISP-999".into(),
        status: PulseStatus::Online,
        timestamp: chrono::Utc::now(),
    };
    let err = sink.send(&pulse).await.unwrap_err();
    assert!(matches!(err, HeartbeatError::Rejected(404)));
}

#[tokio::test]
async fn test_departments_failure_degrades_to_empty() {
    let harness = TestHarness::new("DISP-001").await.unwrap();
    harness.registry.fail_resource("departments");

    let source = RegistrySource::new(client(), harness.url(), "DISP-001");
    let outcome = SnapshotFetcher::new(source).refresh().await;
    let snapshot = &outcome.snapshot;

    assert!(snapshot.departments.is_empty());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(snapshot.token_queue.len(), 3);
    // "abc" coerced, "12" parsed
    assert_eq!(snapshot.token_queue[1].estimated_wait, 12);
    assert_eq!(snapshot.token_queue[2].estimated_wait, 0);
    assert_eq!(snapshot.active_alerts().count(), 1);
    assert_eq!(snapshot.low_stock().count(), 1);
    assert_eq!(snapshot.ot_status.len(), 3);
}

#[tokio::test]
async fn test_registry_pin_reaches_settings() {
    let harness = TestHarness::new("DISP-001").await.unwrap();
    harness.registry.set_pinned_view("DISP-001", Some("ot"));

    let source = RegistrySource::new(client(), harness.url(), "DISP-001");
    let settings = source.settings().await.unwrap().unwrap();
    assert_eq!(settings.content, ContentMode::Mixed);
    assert_eq!(settings.pinned_view, Some(ViewId::Ot));
    assert_eq!(settings.location, "Main Lobby");
}

#[tokio::test]
async fn test_csv_fixture_dir_loads_fully() {
    let harness = TestHarness::new("DISP-001").await.unwrap();
    let outcome = SnapshotFetcher::new(CsvSource::new(harness.data_dir.path())).refresh().await;

    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.snapshot.blood_bank.len(), 3);
    assert_eq!(outcome.snapshot.departments[0].occupied_beds, 18);
    assert!(outcome.settings.is_none());
}
