#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use vigil_core::{ConnectionState, ReconnectSupervisor, SupervisorConfig};

use common::{MockTransport, until};

fn topics() -> Vec<String> {
    vec!["dev/data/all".into(), "dev/topics".into()]
}

async fn connected(supervisor: &ReconnectSupervisor) {
    let mut state = supervisor.watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnects_never_stack_subscriptions() {
    let transport = Arc::new(MockTransport::default());
    let supervisor = Arc::new(ReconnectSupervisor::new(
        transport.clone(),
        topics(),
        SupervisorConfig::default(),
    ));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&supervisor).run(|_| {}, cancel.clone()));

    connected(&supervisor).await;
    for cycle in 2..=3 {
        transport.go_offline();
        let ledger = Arc::clone(&transport.ledger);
        until(Duration::from_secs(5), || {
            let ledger = Arc::clone(&ledger);
            async move { ledger.connects() == cycle }
        })
        .await;
        connected(&supervisor).await;
    }

    let net = transport.ledger.net();
    assert_eq!(net.len(), 2);
    assert!(net.values().all(|n| *n == 1), "net subscriptions: {net:?}");

    cancel.cancel();
    task.await.unwrap();

    // Shutdown unsubscribes too.
    assert!(transport.ledger.net().values().all(|n| *n == 0));
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn messages_reach_the_callback() {
    let transport = Arc::new(MockTransport::default());
    let supervisor = Arc::new(ReconnectSupervisor::new(
        transport.clone(),
        topics(),
        SupervisorConfig::default(),
    ));
    let seen = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let counter = Arc::clone(&seen);
    let task = tokio::spawn(Arc::clone(&supervisor).run(
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        cancel.clone(),
    ));

    connected(&supervisor).await;
    transport.deliver("dev/data/all", json!({ "dev1": "ON" }));
    transport.deliver("dev/topics", json!({ "switch": ["dev1"] }));

    let seen_ref = Arc::clone(&seen);
    until(Duration::from_secs(1), || {
        let seen = Arc::clone(&seen_ref);
        async move { seen.load(Ordering::SeqCst) == 2 }
    })
    .await;

    supervisor.publish("dev/sub", &json!({ "type": "CMD" })).await.unwrap();
    assert_eq!(transport.ledger.published.lock().unwrap().len(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sessions_that_drop_at_once_are_spaced_out() {
    let transport = Arc::new(MockTransport::default());
    transport.drop_sessions.store(true, Ordering::SeqCst);
    let supervisor = Arc::new(ReconnectSupervisor::new(
        transport.clone(),
        topics(),
        SupervisorConfig::default(),
    ));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&supervisor).run(|_| {}, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel.cancel();
    task.await.unwrap();

    // Backoff of 1s, ~2.4s, ~4.9s leaves room for four sessions.
    let connects = transport.ledger.connects();
    assert!((2..=5).contains(&connects), "connects in 10s: {connects}");
    assert!(
        transport
            .ledger
            .connect_gaps()
            .iter()
            .all(|gap| *gap >= Duration::from_millis(900)),
        "gaps: {:?}",
        transport.ledger.connect_gaps()
    );
    assert!(transport.ledger.net().values().all(|n| *n == 0));
}

#[tokio::test(start_paused = true)]
async fn refused_subscriptions_back_off_between_sessions() {
    let transport = Arc::new(MockTransport::default());
    transport.reject_subscribe.store(true, Ordering::SeqCst);
    let supervisor = Arc::new(ReconnectSupervisor::new(
        transport.clone(),
        topics(),
        SupervisorConfig {
            subscribe_attempts: 1,
            ..SupervisorConfig::default()
        },
    ));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&supervisor).run(|_| {}, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_ne!(supervisor.state(), ConnectionState::Connected);
    cancel.cancel();
    task.await.unwrap();

    let gaps = transport.ledger.connect_gaps();
    assert!(gaps.len() >= 2, "gaps: {gaps:?}");
    assert!(gaps[0] >= Duration::from_millis(900), "gaps: {gaps:?}");
    assert!(
        gaps.windows(2).all(|w| w[1] > w[0]),
        "backoff should grow between sessions: {gaps:?}"
    );
    assert!(transport.ledger.net().is_empty());
}

#[tokio::test]
async fn publish_without_session_is_unavailable() {
    let supervisor = ReconnectSupervisor::new(
        Arc::new(MockTransport::default()),
        topics(),
        SupervisorConfig::default(),
    );

    let err = supervisor.publish("dev/sub", &json!({})).await.unwrap_err();

    assert!(matches!(err, vigil_core::CoreError::SourceUnavailable { .. }));
}
