//! End-to-end overlay and presence scenarios
//!
//! Exercises the coordinator, reconciler and tracker together against the
//! in-crate mocks:
//! - send / sync convergence without duplicates
//! - optimistic sends surviving remote failure
//! - terminal actions clearing only their own target
//! - distance and timer suppression of presence reports

use elohim_network_sync::{
    Config, FileStore, KeyValueStore, MemoryStore, MockConnectionApi, MockLocationProvider,
    MockPresenceApi, NetworkSync, PendingRequest, PresenceSample, SuggestionQuery,
    ConnectionStatus, Suggestion, TerminalOutcome,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Meters per degree of latitude on the haversine sphere
const M_PER_DEG: f64 = 111_195.0;

fn setup(api: MockConnectionApi) -> (Arc<MockConnectionApi>, NetworkSync) {
    setup_with_store(api, Arc::new(MemoryStore::new()))
}

fn setup_with_store(
    api: MockConnectionApi,
    store: Arc<dyn KeyValueStore>,
) -> (Arc<MockConnectionApi>, NetworkSync) {
    let api = Arc::new(api);
    let sync = NetworkSync::new(
        Config::default(),
        api.clone(),
        Arc::new(MockPresenceApi::new()),
        store,
    );
    (api, sync)
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Pending overlay
// =============================================================================

#[tokio::test]
async fn test_send_then_sync_has_no_duplicate() {
    let (_, sync) = setup(MockConnectionApi::new().with_send_visible(true));

    sync.coordinator().send("u1", None).await.unwrap();
    let pending = sync.load().await;

    assert_eq!(pending, ids(&["u1"]));
    let overlay = sync.reconciler().overlay().lock().await;
    assert!(overlay.session_pending().await.contains("u1"));
    assert!(overlay.server_confirmed().await.contains("u1"));
}

#[tokio::test]
async fn test_failed_send_survives_empty_snapshot() {
    let (api, sync) = setup(MockConnectionApi::new());
    api.set_fail_send(true);

    let outcome = sync.coordinator().send("u1", Some("hello")).await.unwrap();
    assert!(!outcome.delivered());

    let pending = sync.load().await;
    assert!(pending.contains("u1"));
}

#[tokio::test]
async fn test_accept_clears_only_its_target() {
    let (_, sync) = setup(MockConnectionApi::new().with_pending(vec![
        PendingRequest { id: "r2".into(), recipient_id: "u2".into() },
        PendingRequest { id: "r3".into(), recipient_id: "u3".into() },
    ]));
    sync.load().await;

    let outcome = sync.coordinator().accept("r2").await.unwrap();
    assert_eq!(outcome, TerminalOutcome::Cleared { target_id: "u2".into() });

    let pending = sync.combined_pending().await;
    assert!(!pending.contains("u2"));
    assert!(pending.contains("u3"));

    let overlay = sync.reconciler().overlay().lock().await;
    assert_eq!(overlay.resolve_target("r3").await.as_deref(), Some("u3"));
}

#[tokio::test]
async fn test_answered_request_drops_on_next_sync() {
    let (api, sync) = setup(MockConnectionApi::new().with_pending(vec![PendingRequest {
        id: "r1".into(),
        recipient_id: "u1".into(),
    }]));
    assert_eq!(sync.load().await, ids(&["u1"]));

    // the other party accepted; this client never cleared it
    api.set_pending(vec![]);
    assert!(sync.load().await.is_empty());
}

#[tokio::test]
async fn test_suggestions_reflect_pending_sends() {
    let (_, sync) = setup(
        MockConnectionApi::new()
            .with_suggestions(vec![Suggestion::new("u1"), Suggestion::new("u2")]),
    );
    sync.coordinator().send("u2", None).await.unwrap();

    let annotated = sync.suggestions(&SuggestionQuery::new().with_limit(10)).await;
    let statuses: Vec<_> = annotated
        .iter()
        .map(|a| (a.suggestion.id.as_str(), a.display_status.clone()))
        .collect();
    assert_eq!(
        statuses,
        vec![("u1", ConnectionStatus::None), ("u2", ConnectionStatus::Pending)]
    );
}

#[tokio::test]
async fn test_overlay_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("overlay.json");

    {
        let (api, sync) = setup_with_store(MockConnectionApi::new(), Arc::new(FileStore::new(&path)));
        api.set_fail_send(true);
        sync.coordinator().send("u7", None).await.unwrap();
    }

    let (api, sync) = setup_with_store(MockConnectionApi::new(), Arc::new(FileStore::new(&path)));
    api.set_fail_list(true);
    assert_eq!(sync.load().await, ids(&["u7"]));
}

// =============================================================================
// Presence
// =============================================================================

fn presence_setup() -> (Arc<MockPresenceApi>, Arc<MockLocationProvider>, NetworkSync) {
    let presence = Arc::new(MockPresenceApi::new());
    let provider = Arc::new(MockLocationProvider::new());
    let sync = NetworkSync::new(
        Config::default(),
        Arc::new(MockConnectionApi::new()),
        presence.clone(),
        Arc::new(MemoryStore::new()),
    );
    (presence, provider, sync)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_small_moves_are_suppressed_large_moves_reported() {
    let (presence, provider, sync) = presence_setup();
    let tracker = sync.presence_tracker(provider.clone());
    assert!(tracker.start().await.success);

    provider.push(PresenceSample::at(48.0, 11.0, 0)).await;
    settle().await;
    assert_eq!(presence.report_count(), 1);

    provider.push(PresenceSample::at(48.0 + 80.0 / M_PER_DEG, 11.0, 1)).await;
    settle().await;
    assert_eq!(presence.report_count(), 1);

    provider.push(PresenceSample::at(48.0 + 150.0 / M_PER_DEG, 11.0, 2)).await;
    settle().await;
    assert_eq!(presence.report_count(), 2);

    tracker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_two_close_samples_report_at_most_once() {
    let (presence, provider, sync) = presence_setup();
    let tracker = sync.presence_tracker(provider.clone());
    tracker.start().await;

    provider.push(PresenceSample::at(10.0, 10.0, 0)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    provider.push(PresenceSample::at(10.0 + 50.0 / M_PER_DEG, 10.0, 2_000)).await;
    settle().await;

    assert!(presence.report_count() <= 1);
    tracker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_sample_after_interval_is_reported() {
    let (presence, provider, sync) = presence_setup();
    let tracker = sync.presence_tracker(provider.clone());
    tracker.start().await;

    provider.push(PresenceSample::at(10.0, 10.0, 0)).await;
    settle().await;
    assert_eq!(presence.report_count(), 1);

    // the timer itself reports at the 5 minute mark
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(presence.report_count(), 2);

    // a close sample right after is suppressed again
    provider.push(PresenceSample::at(10.0 + 10.0 / M_PER_DEG, 10.0, 1)).await;
    settle().await;
    assert_eq!(presence.report_count(), 2);

    tracker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_sample_reported_once_interval_elapsed() {
    let (presence, provider, sync) = presence_setup();
    let tracker = sync.presence_tracker(provider.clone());

    // manual report stamps the throttle; the timer starts later
    tracker.report_now(PresenceSample::at(10.0, 10.0, 0)).await.unwrap();
    assert_eq!(presence.report_count(), 1);
    tokio::time::sleep(Duration::from_secs(200)).await;
    tracker.start().await;

    tokio::time::sleep(Duration::from_secs(99)).await;
    provider.push(PresenceSample::at(10.0 + 20.0 / M_PER_DEG, 10.0, 1)).await;
    settle().await;
    assert_eq!(presence.report_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    provider.push(PresenceSample::at(10.0 + 30.0 / M_PER_DEG, 10.0, 2)).await;
    settle().await;
    assert_eq!(presence.report_count(), 2);

    tracker.stop().await;
}
