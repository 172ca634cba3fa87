//! End-to-end engine tests against a scripted backend.
//!
//! All tests run on a paused clock so retry delays, poll cadences and
//! refresh timers advance deterministically.

mod common;

use std::time::Duration;

use common::*;
use linkwatch::{ConnectionPhase, PushConnectionState, ReconcilerStats};

#[tokio::test(start_paused = true)]
async fn test_code_rotation_releases_before_issuing() {
    let backend = MockBackend::new()
        .with_qr_image("A", b"png-A")
        .with_qr_image("B", b"png-B")
        .build();
    let harness = EngineHarness::start(backend);
    settle().await;

    let stream = harness.push_stream();
    stream.send_status(r#"{"state":"initializing","message_count":0}"#);
    stream.send_status(r#"{"state":"qr_ready","message_count":0,"qr":"A"}"#);
    settle().await;
    stream.send_status(r#"{"state":"qr_ready","message_count":0,"qr":"B"}"#);
    settle().await;

    let ledger = harness.store.ledger();
    assert_eq!(ledger.len(), 3, "ledger: {:?}", ledger);
    match (&ledger[0], &ledger[1], &ledger[2]) {
        (ArtifactEvent::Issued(a), ArtifactEvent::Released(released), ArtifactEvent::Issued(b)) => {
            assert_eq!(a, released);
            assert_ne!(a, b);
        }
        other => panic!("A must be released before B is issued: {:?}", other),
    }
    assert_eq!(harness.store.max_live(), 1);

    let snapshot = harness.engine.current_snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::QrReady);
    assert_eq!(snapshot.message_count, 0);
    assert_eq!(
        harness.engine.current_artifact().map(|h| h.payload_key),
        Some("B".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_delayed_poll_does_not_regress_count() {
    let backend = MockBackend::new()
        .with_status(r#"{"state":"connected","message_count":0}"#)
        .build();
    let harness = EngineHarness::start(backend.clone());
    settle().await;

    harness
        .push_stream()
        .send_status(r#"{"state":"connected","message_count":40}"#);
    settle().await;
    assert_eq!(harness.engine.current_snapshot().message_count, 40);

    // Slow cadence while connected: the next poll lands 30s later with a stale zero
    advance(Duration::from_secs(31)).await;
    assert!(backend.requests_to(STATUS_URL).len() >= 2);

    let snapshot = harness.engine.current_snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert_eq!(snapshot.message_count, 40);
}

#[tokio::test(start_paused = true)]
async fn test_count_resets_only_on_disconnect() {
    let harness = EngineHarness::start(MockBackend::new().build());
    settle().await;

    let stream = harness.push_stream();
    stream.send_status(r#"{"state":"connected","message_count":40}"#);
    stream.send_status(r#"{"state":"error","error":"phone offline"}"#);
    settle().await;
    let snapshot = harness.engine.current_snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Error);
    assert_eq!(snapshot.message_count, 40);
    assert_eq!(snapshot.error_detail.as_deref(), Some("phone offline"));

    stream.send_status(r#"{"state":"disconnected","message_count":40}"#);
    settle().await;
    assert_eq!(harness.engine.current_snapshot().message_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_published_count_is_non_decreasing() {
    let harness = EngineHarness::start(MockBackend::new().build());
    let mut snapshots = harness.engine.subscribe_snapshots();
    settle().await;

    let stream = harness.push_stream();
    for event in [
        r#"{"state":"initializing"}"#,
        r#"{"state":"qr_ready","qr":"data:image/png;base64,QQ=="}"#,
        r#"{"state":"authenticating","message_count":0}"#,
        r#"{"state":"loading_chats","message_count":10,"progress":20}"#,
        r#"{"state":"loading_chats","message_count":3,"progress":60}"#,
        r#"{"state":"connected","message_count":25}"#,
        r#"{"state":"connected"}"#,
    ] {
        stream.send_status(event);
    }

    let mut observed = Vec::new();
    while observed.len() < 7 {
        tokio::select! {
            changed = snapshots.changed() => {
                changed.unwrap();
                observed.push(snapshots.borrow_and_update().message_count);
            }
            _ = advance(Duration::from_millis(100)) => break,
        }
    }

    assert!(
        observed.windows(2).all(|w| w[0] <= w[1]),
        "counts went backwards: {:?}",
        observed
    );
    assert_eq!(harness.engine.current_snapshot().message_count, 25);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_scope_fields_are_never_exposed() {
    let harness = EngineHarness::start(MockBackend::new().build());
    settle().await;

    harness.push_stream().send_status(
        r#"{"state":"connected","qr":"stale-code","error":"old","progress":50,
            "account":{"display_name":"Ana","phone_identifier":"+1555"}}"#
            .replace('\n', "")
            .as_str(),
    );
    settle().await;

    let snapshot = harness.engine.current_snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert_eq!(snapshot.code_payload, None);
    assert_eq!(snapshot.error_detail, None);
    assert_eq!(snapshot.progress_percent, 0);
    assert_eq!(
        snapshot.account.map(|a| a.display_name),
        Some("Ana".to_string())
    );
    assert_eq!(harness.engine.current_artifact(), None);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_state_is_rejected_and_stream_continues() {
    let harness = EngineHarness::start(MockBackend::new().build());
    settle().await;

    let stream = harness.push_stream();
    stream.send_status(r#"{"state":"initializing"}"#);
    stream.send_status(r#"{"state":"pairing"}"#);
    stream.send_chunk("event: status\ndata: {not json\n\n");
    stream.send_status(r#"{"state":"connecting"}"#);
    settle().await;

    assert_eq!(
        harness.engine.current_snapshot().phase,
        ConnectionPhase::Connecting
    );
    let stats: ReconcilerStats = harness.engine.reconciler_stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.accepted, 2);
    assert_eq!(harness.backend.stream_handles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_leaving_qr_ready_releases_every_artifact() {
    let harness = EngineHarness::start(MockBackend::new().build());
    settle().await;

    let stream = harness.push_stream();
    for round in 0..3 {
        stream.send_status(&format!(
            r#"{{"state":"qr_ready","qr":"data:image/png;base64,Q{}=="}}"#,
            round
        ));
        settle().await;
        assert_eq!(harness.store.live_count(), 1);

        stream.send_status(r#"{"state":"initializing"}"#);
        settle().await;
        assert_eq!(harness.store.live_count(), 0);
    }

    assert_eq!(harness.store.issued_count(), 3);
    assert_eq!(harness.store.released_count(), 3);
    assert_eq!(harness.store.max_live(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_leaving_qr_ready_mid_refresh_releases_at_once() {
    let qr_url = format!("{}A", QR_URL_PREFIX);
    let backend = MockBackend::new()
        .with_status(r#"{"state":"qr_ready","qr":"A"}"#)
        .build();
    backend.push_response(&qr_url, MockResponse::bytes(b"png-A", "image/png"));
    backend.set_response(
        &qr_url,
        MockResponse::bytes(b"png-A", "image/png").delayed(Duration::from_secs(10)),
    );
    let harness = EngineHarness::start(backend);
    settle().await;
    assert_eq!(harness.store.live_count(), 1);

    // The refresh fetch is now in flight
    advance(Duration::from_secs(55)).await;
    assert_eq!(harness.backend.requests_to(&qr_url).len(), 2);
    assert_eq!(harness.store.live_count(), 1);

    harness
        .push_stream()
        .send_status(r#"{"state":"authenticating"}"#);
    settle().await;

    assert_eq!(harness.store.live_count(), 0);
    assert_eq!(harness.engine.current_artifact(), None);
}

#[tokio::test(start_paused = true)]
async fn test_push_reconnect_keeps_one_connection() {
    let harness = EngineHarness::start(MockBackend::new().build());
    let push_state = harness.engine.subscribe_push_state();
    settle().await;
    assert_eq!(harness.backend.active_streams(), 1);
    assert_eq!(*push_state.borrow(), PushConnectionState::Connected);

    harness.push_stream().close();
    settle().await;
    assert_eq!(
        *push_state.borrow(),
        PushConnectionState::Reconnecting { attempt: 1 }
    );

    advance(Duration::from_secs(2)).await;
    assert_eq!(harness.backend.active_streams(), 1);
    assert_eq!(harness.backend.stream_handles().len(), 2);
    assert_eq!(*push_state.borrow(), PushConnectionState::Connected);

    // Events on the new connection are applied
    harness
        .push_stream()
        .send_status(r#"{"state":"connected","message_count":7}"#);
    settle().await;
    assert_eq!(harness.engine.current_snapshot().message_count, 7);
}

#[tokio::test(start_paused = true)]
async fn test_poll_cadence_follows_phase() {
    let backend = MockBackend::new()
        .with_status(r#"{"state":"connected","message_count":1}"#)
        .build();
    let harness = EngineHarness::start(backend.clone());
    settle().await;
    assert_eq!(backend.requests_to(STATUS_URL).len(), 1);

    advance(Duration::from_secs(10)).await;
    assert_eq!(backend.requests_to(STATUS_URL).len(), 1);

    // Push moves the link into a transitional phase: next poll 2s later
    backend.set_response(STATUS_URL, MockResponse::json(r#"{"state":"initializing"}"#));
    harness
        .push_stream()
        .send_status(r#"{"state":"initializing"}"#);
    settle().await;

    advance(Duration::from_secs(2)).await;
    assert_eq!(backend.requests_to(STATUS_URL).len(), 2);
    advance(Duration::from_secs(2)).await;
    assert_eq!(backend.requests_to(STATUS_URL).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_poll_keeps_state_when_push_is_down() {
    let backend = MockBackend::new()
        .with_status(r#"{"state":"qr_ready","qr":"data:image/png;base64,QQ=="}"#)
        .build();
    backend.set_response(
        STREAM_URL,
        MockResponse::Error(HttpError::ConnectionFailed("refused".to_string())),
    );
    let harness = EngineHarness::start(backend);
    settle().await;

    assert_eq!(
        harness.engine.current_snapshot().phase,
        ConnectionPhase::QrReady
    );
    assert_eq!(harness.store.live_count(), 1);
    assert!(matches!(
        *harness.engine.subscribe_push_state().borrow(),
        PushConnectionState::Reconnecting { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_poll_failures_are_invisible() {
    let backend = MockBackend::new().with_status_unreachable().build();
    let harness = EngineHarness::start(backend);
    settle().await;

    harness
        .push_stream()
        .send_status(r#"{"state":"loading_chats","progress":30}"#);
    advance(Duration::from_secs(10)).await;

    let snapshot = harness.engine.current_snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::LoadingChats);
    assert_eq!(snapshot.progress_percent, 30);
}

#[tokio::test(start_paused = true)]
async fn test_presentation_follows_snapshot() {
    let harness = EngineHarness::start(MockBackend::new().build());
    let views = harness.engine.subscribe_presentation();
    settle().await;

    let started = chrono::Utc::now() - chrono::Duration::seconds(30);
    harness.push_stream().send_status(&format!(
        r#"{{"state":"qr_ready","qr":"data:image/png;base64,QQ==","started_at":"{}"}}"#,
        started.to_rfc3339()
    ));
    settle().await;

    let view = views.borrow().clone();
    assert_eq!(view.phase, ConnectionPhase::QrReady);
    assert_eq!(view.status_label, "Scan the QR code with your phone");
    assert!(view.elapsed >= Duration::from_secs(30));
    assert!(view.hint.is_some());

    harness
        .push_stream()
        .send_status(r#"{"state":"connected","message_count":3}"#);
    settle().await;

    let view = views.borrow().clone();
    assert_eq!(view.elapsed, Duration::ZERO);
    assert_eq!(view.hint, None);
    assert_eq!(view.status_label, "Connected, 3 messages");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cleans_up_everything() {
    let mut harness = EngineHarness::start(MockBackend::new().build());
    settle().await;

    harness
        .push_stream()
        .send_status(r#"{"state":"qr_ready","qr":"data:image/png;base64,QQ=="}"#);
    settle().await;
    assert_eq!(harness.store.live_count(), 1);
    assert_eq!(harness.backend.active_streams(), 1);

    let artifacts = harness.engine.subscribe_artifacts();
    harness.engine.shutdown();
    assert_eq!(harness.store.live_count(), 0);
    assert_eq!(*artifacts.borrow(), None);

    harness.engine.wait_stopped().await;
    assert_eq!(harness.backend.active_streams(), 0);
    assert!(harness.engine.tasks_finished());

    // Nothing keeps polling or reconnecting afterwards
    let requests = harness.backend.get_requests().len();
    advance(Duration::from_secs(120)).await;
    assert_eq!(harness.backend.get_requests().len(), requests);
    assert_eq!(harness.store.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_artifact() {
    let harness = EngineHarness::start(MockBackend::new().build());
    settle().await;
    harness
        .push_stream()
        .send_status(r#"{"state":"qr_ready","qr":"data:image/png;base64,QQ=="}"#);
    settle().await;

    let EngineHarness {
        backend,
        store,
        engine,
    } = harness;
    assert_eq!(store.live_count(), 1);
    drop(engine);
    assert_eq!(store.live_count(), 0);

    settle().await;
    assert_eq!(backend.active_streams(), 0);
}
