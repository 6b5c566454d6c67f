//! Lifecycle tests for the controller against an in-memory session provider.
//!
//! Run with:
//!   cargo test -p pwod-controller --test lifecycle

use std::sync::Arc;
use std::time::Duration;

use pwod_controller::{
    ChannelWatchSource, Controller, ControllerConfig, ControllerError, EventDispatcher,
    LifecycleRegistry, WatchEvent,
};
use pwod_core::{ApplicationType, WorkloadRecord, WorkloadUid};
use pwod_session::{MockSessionProvider, SessionContext, SessionSettings};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// How long to wait for the controller to process events.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

fn record(uid: &str, containers: usize, init_containers: usize) -> WorkloadRecord {
    WorkloadRecord::new(uid, "bookinfo", format!("pod-{uid}"))
        .with_containers(containers, init_containers)
        .with_ip("10.4.0.7")
}

fn uid(uid: &str) -> WorkloadUid {
    WorkloadUid::new(uid)
}

fn dispatcher(provider: &MockSessionProvider) -> EventDispatcher {
    EventDispatcher::new(
        Arc::new(LifecycleRegistry::new()),
        SessionContext::new(
            Arc::new(provider.clone()),
            SessionSettings::default(),
            CancellationToken::new(),
        ),
    )
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(SETTLE_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn gateway_session_started_and_cleaned_up() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.wait_idle().await;

    assert_eq!(provider.run_count(), 1);
    assert_eq!(provider.runs()[0].app_type, ApplicationType::Gateway);
    assert!(dispatcher.registry().contains(&uid("u1")));

    dispatcher.dispatch(WatchEvent::Forgotten(uid("u1")));
    dispatcher.wait_idle().await;

    assert_eq!(provider.cleanup_count(), 1);
    assert!(!dispatcher.registry().contains(&uid("u1")));
    assert_eq!(provider.live_sessions(), 0);
}

#[tokio::test]
async fn failed_sidecar_start_is_forgotten_without_cleanup() {
    let provider = MockSessionProvider::new();
    provider.fail_for("u2");
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u2", 2, 1)));
    dispatcher.wait_idle().await;

    assert_eq!(provider.run_count(), 1);
    assert_eq!(provider.runs()[0].app_type, ApplicationType::Sidecar);
    assert!(!dispatcher.registry().contains(&uid("u2")));

    dispatcher.dispatch(WatchEvent::Forgotten(uid("u2")));
    dispatcher.wait_idle().await;

    assert_eq!(provider.cleanup_count(), 0);
    assert!(dispatcher.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_observations_are_independent() {
    let provider = MockSessionProvider::new();
    let dispatcher = Arc::new(dispatcher(&provider));

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let containers = if i % 2 == 0 { 1 } else { 2 };
                dispatcher.dispatch(WatchEvent::Observed(record(&format!("w{i}"), containers, 1)));
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    dispatcher.wait_idle().await;

    assert_eq!(provider.run_count(), 64);
    assert_eq!(dispatcher.registry().len(), 64);
    assert_eq!(provider.live_sessions(), 64);
    for i in 0..64 {
        assert!(dispatcher.registry().contains(&uid(&format!("w{i}"))));
    }

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher.dispatch(WatchEvent::Forgotten(uid(&format!("w{i}"))));
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    dispatcher.wait_idle().await;

    assert!(dispatcher.registry().is_empty());
    assert_eq!(provider.live_sessions(), 0);
    assert_eq!(provider.double_releases(), 0);
}

#[tokio::test]
async fn forgotten_on_empty_registry_is_noop() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Forgotten(uid("nobody")));
    dispatcher.wait_idle().await;

    assert!(dispatcher.registry().is_empty());
    assert_eq!(provider.run_count(), 0);
    assert_eq!(provider.cleanup_count(), 0);
}

#[tokio::test]
async fn ambient_workload_never_reaches_provider() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("amb", 3, 0)));
    dispatcher.dispatch(WatchEvent::Forgotten(uid("amb")));
    dispatcher.wait_idle().await;

    assert_eq!(provider.run_count(), 0);
    assert_eq!(provider.cleanup_count(), 0);
    assert!(dispatcher.registry().is_empty());
}

#[tokio::test]
async fn duplicate_observation_keeps_one_session() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.wait_idle().await;
    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.wait_idle().await;

    assert_eq!(provider.run_count(), 1);
    assert_eq!(provider.live_sessions_for("u1"), 1);
}

#[tokio::test]
async fn changed_workload_replaces_session() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.wait_idle().await;
    dispatcher.dispatch(WatchEvent::Observed(
        record("u1", 1, 0).with_label("version", "v2"),
    ));
    dispatcher.wait_idle().await;

    assert_eq!(provider.run_count(), 2);
    assert_eq!(provider.cleanup_count(), 1);
    assert_eq!(provider.live_sessions_for("u1"), 1);
    assert_eq!(
        provider.runs()[1].labels.get("version").map(String::as_str),
        Some("v2")
    );
    assert!(dispatcher.registry().contains(&uid("u1")));
}

#[tokio::test]
async fn workload_losing_its_proxy_is_cleaned_up() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 2, 1)));
    dispatcher.wait_idle().await;
    dispatcher.dispatch(WatchEvent::Observed(record("u1", 2, 0)));
    dispatcher.wait_idle().await;

    assert_eq!(provider.cleanup_count(), 1);
    assert_eq!(provider.live_sessions(), 0);
    assert!(dispatcher.registry().is_empty());
}

#[tokio::test]
async fn forgotten_during_start_cancels_it() {
    let provider = MockSessionProvider::new();
    provider.hold_starts();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    assert!(dispatcher.registry().is_starting(&uid("u1")));

    dispatcher.dispatch(WatchEvent::Forgotten(uid("u1")));
    dispatcher.wait_idle().await;

    assert!(dispatcher.registry().is_empty());
    assert_eq!(provider.live_sessions(), 0);
    assert_eq!(provider.cleanup_count(), 0);
}

#[tokio::test]
async fn forgotten_during_uncancellable_start_releases_session() {
    let provider = MockSessionProvider::new();
    provider.hold_starts();
    provider.ignore_cancel();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.dispatch(WatchEvent::Forgotten(uid("u1")));
    provider.release_starts(1);
    dispatcher.wait_idle().await;

    // The start completed after the workload was gone; its session must not leak.
    assert!(dispatcher.registry().is_empty());
    assert_eq!(provider.run_count(), 1);
    assert_eq!(provider.cleanup_count(), 1);
    assert_eq!(provider.live_sessions(), 0);
}

#[tokio::test]
async fn readded_workload_after_forget_starts_again() {
    let provider = MockSessionProvider::new();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.dispatch(WatchEvent::Forgotten(uid("u1")));
    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.wait_idle().await;

    assert!(dispatcher.registry().contains(&uid("u1")));
    assert_eq!(provider.live_sessions_for("u1"), 1);
}

#[tokio::test]
async fn cleanup_failure_still_removes_entry() {
    let provider = MockSessionProvider::new();
    provider.fail_cleanups();
    let dispatcher = dispatcher(&provider);

    dispatcher.dispatch(WatchEvent::Observed(record("u1", 1, 0)));
    dispatcher.wait_idle().await;
    dispatcher.dispatch(WatchEvent::Forgotten(uid("u1")));
    dispatcher.wait_idle().await;

    assert!(dispatcher.registry().is_empty());
    assert_eq!(provider.cleanup_count(), 1);
}

// =============================================================================
// Controller
// =============================================================================

#[tokio::test]
async fn controller_runs_until_cancelled() {
    let provider = MockSessionProvider::new();
    let (feed, source) = ChannelWatchSource::new(16);
    let controller = Controller::new(
        source,
        Arc::new(provider.clone()),
        SessionSettings::default(),
        ControllerConfig::default(),
    );
    let registry = controller.registry();
    let cancel = CancellationToken::new();
    let running = tokio::spawn(controller.run(cancel.clone()));

    feed.send(WatchEvent::Observed(record("gw", 1, 0))).await.unwrap();
    feed.send(WatchEvent::Observed(record("app", 2, 1))).await.unwrap();
    feed.send(WatchEvent::Observed(record("amb", 2, 0))).await.unwrap();
    eventually(|| registry.len() == 2).await;

    feed.send(WatchEvent::Forgotten(uid("gw"))).await.unwrap();
    eventually(|| !registry.contains(&uid("gw"))).await;
    assert!(registry.contains(&uid("app")));

    cancel.cancel();
    timeout(SETTLE_TIMEOUT, running)
        .await
        .expect("controller stops after cancel")
        .unwrap()
        .unwrap();

    // No final sweep: the remaining session is left registered.
    assert!(registry.contains(&uid("app")));
    assert_eq!(provider.cleanup_count(), 1);
}

#[tokio::test]
async fn controller_fails_when_watch_ends() {
    let provider = MockSessionProvider::new();
    let (feed, source) = ChannelWatchSource::new(16);
    let controller = Controller::new(
        source,
        Arc::new(provider.clone()),
        SessionSettings::default(),
        ControllerConfig::default(),
    );
    let registry = controller.registry();

    feed.send(WatchEvent::Observed(record("gw", 1, 0))).await.unwrap();
    drop(feed);

    let result = timeout(SETTLE_TIMEOUT, controller.run(CancellationToken::new()))
        .await
        .expect("controller stops when the watch ends");

    assert!(matches!(result, Err(ControllerError::WatchEnded)));
    // The start may have been cancelled by the shutdown; either way nothing leaks.
    assert_eq!(provider.live_sessions(), registry.len());
}

#[tokio::test]
async fn controller_rejects_invalid_config() {
    let (_feed, source) = ChannelWatchSource::new(1);
    let controller = Controller::new(
        source,
        Arc::new(MockSessionProvider::new()),
        SessionSettings::default(),
        ControllerConfig {
            event_buffer: 0,
            ..Default::default()
        },
    );

    let result = controller.run(CancellationToken::new()).await;
    assert!(matches!(result, Err(ControllerError::Config(_))));
}
