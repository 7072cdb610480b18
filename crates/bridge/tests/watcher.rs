//! Relay watcher lifecycle against a scripted relay.

mod common;

use std::time::Duration;

use bridge::WatcherState;
use common::*;
use serde_json::json;
use transport::{RelayEvent, TransportError};

const FAR_FUTURE: u64 = 9_999_999_999;

#[tokio::test]
async fn idle_without_remote_sessions() {
    let h = harness(MockUi::approving());
    let watcher = h.service.start_watcher();

    let mut state = watcher.subscribe_state();
    state.wait_for(|s| *s == WatcherState::Idle).await.unwrap();
    assert!(h.relay.subscriptions().is_empty());

    watcher.stop().await;
}

#[tokio::test]
async fn subscribes_when_a_session_appears() {
    let h = harness(MockUi::approving());
    let watcher = h.service.start_watcher();
    let mut state = watcher.subscribe_state();

    let dapp = Dapp::new();
    let wallet_id = connect_remote(&h, &dapp).await;

    state.wait_for(|s| *s == WatcherState::Streaming).await.unwrap();
    let subscriptions = h.relay.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].0, vec![wallet_id]);
    assert_ne!(subscriptions[0].0, vec![dapp.id().to_string()]);
    assert_eq!(subscriptions[0].1, None);

    watcher.stop().await;
}

#[tokio::test]
async fn routes_stream_messages_and_resumes_from_cursor() {
    let h = harness(MockUi::approving());
    let dapp = Dapp::new();
    let wallet_id = connect_remote(&h, &dapp).await;

    h.relay
        .script(vec![dapp.message_to(&wallet_id, &send_transaction("1", FAR_FUTURE), "55")]);
    let watcher = h.service.start_watcher();

    let notified = h.ui.wait_for_notifications(1).await;
    assert_eq!(notified[0].from, dapp.id());
    assert_eq!(notified[0].id, "1");

    // A second session forces a resubscribe that carries the cursor.
    let other = Dapp::new();
    connect_remote(&h, &other).await;
    eventually(|| h.relay.subscriptions().len() == 2).await;
    let (ids, cursor) = h.relay.subscriptions()[1].clone();
    assert_eq!(ids.len(), 2);
    assert_eq!(cursor.as_deref(), Some("55"));

    watcher.stop().await;
}

#[tokio::test]
async fn relay_transaction_round_trip_through_watcher() {
    let h = harness(MockUi::approving());
    let dapp = Dapp::new();
    let wallet_id = connect_remote(&h, &dapp).await;

    h.relay
        .script(vec![dapp.message_to(&wallet_id, &send_transaction("7", FAR_FUTURE), "1")]);
    let watcher = h.service.start_watcher();

    let notified = h.ui.wait_for_notifications(1).await;
    assert_eq!(notified[0].from, dapp.id());
    h.service.approve_transaction(dapp.id(), EMPTY_CELL).await.unwrap();

    let post = h.relay.last_post();
    assert_eq!(post.client_id, wallet_id);
    assert_eq!(dapp.open(&post), json!({ "result": EMPTY_CELL, "id": "7" }));
    assert!(h.service.active_requests().unwrap().is_empty());

    watcher.stop().await;
}

#[tokio::test]
async fn dapp_mailbox_is_not_watched() {
    let h = harness(MockUi::approving());
    let dapp = Dapp::new();
    let wallet_id = connect_remote(&h, &dapp).await;

    // Posted to the dApp's own mailbox, so the wallet's subscription never
    // sees it.
    h.relay.script(vec![Scripted::Message {
        to: dapp.id().to_string(),
        event: dapp.request_event(&wallet_id, &send_transaction("1", FAR_FUTURE), "1"),
    }]);
    let watcher = h.service.start_watcher();
    let mut state = watcher.subscribe_state();
    state.wait_for(|s| *s == WatcherState::Streaming).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.relay.subscriptions()[0].0, vec![wallet_id]);
    assert!(h.ui.notified().is_empty());
    watcher.stop().await;
}

#[tokio::test]
async fn non_message_events_are_ignored() {
    let h = harness(MockUi::approving());
    let dapp = Dapp::new();
    connect_remote(&h, &dapp).await;
    let posts_before = h.relay.posts().len();

    h.relay.script(vec![Scripted::Event(RelayEvent {
        id: None,
        event: "heartbeat".into(),
        data: String::new(),
    })]);
    let watcher = h.service.start_watcher();
    let mut state = watcher.subscribe_state();
    state.wait_for(|s| *s == WatcherState::Streaming).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.relay.posts().len(), posts_before);
    assert!(h.ui.notified().is_empty());
    watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stream_error_schedules_one_delayed_reconnect() {
    let h = harness(MockUi::approving());
    let dapp = Dapp::new();
    connect_remote(&h, &dapp).await;

    h.relay
        .script(vec![Scripted::Fail(TransportError::Stream("connection reset".into()))]);
    let watcher = h.service.start_watcher();
    let mut state = watcher.subscribe_state();

    state.wait_for(|s| *s == WatcherState::Reconnecting).await.unwrap();
    assert_eq!(h.relay.subscriptions().len(), 1);

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.relay.subscriptions().len(), 1);
    assert_eq!(watcher.state(), WatcherState::Reconnecting);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.relay.subscriptions().len(), 2);
    assert_eq!(watcher.state(), WatcherState::Streaming);

    watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn removing_last_session_goes_idle() {
    let h = harness(MockUi::approving());
    let dapp = Dapp::new();
    connect_remote(&h, &dapp).await;

    h.relay.script(vec![Scripted::Fail(TransportError::StreamClosed)]);
    let watcher = h.service.start_watcher();
    let mut state = watcher.subscribe_state();
    state.wait_for(|s| *s == WatcherState::Reconnecting).await.unwrap();

    h.service.disconnect(APP_URL).await.unwrap();
    state.wait_for(|s| *s == WatcherState::Idle).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.relay.subscriptions().len(), 1);
    watcher.stop().await;
}

#[tokio::test]
async fn stop_reports_stopped() {
    let h = harness(MockUi::approving());
    let watcher = h.service.start_watcher();
    let state = watcher.subscribe_state();

    watcher.stop().await;
    assert_eq!(*state.borrow(), WatcherState::Stopped);
}
