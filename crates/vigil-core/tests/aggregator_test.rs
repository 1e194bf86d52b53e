#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use vigil_core::{
    Aggregator, AggregatorConfig, CommandResponse, ConnectionState, Domain, Report, Sources,
    TelemetrySource,
};

use common::MockTransport;

fn telemetry_aggregator() -> (Arc<MockTransport>, Aggregator, mpsc::UnboundedReceiver<Report>) {
    let transport = Arc::new(MockTransport::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let sources = Sources {
        telemetry: Some(TelemetrySource {
            transport: transport.clone(),
            things: vec!["dev".into()],
        }),
        ..Sources::default()
    };
    let aggregator = Aggregator::new(AggregatorConfig::default(), sources, Arc::new(tx));
    (transport, aggregator, rx)
}

async fn connected(aggregator: &Aggregator) {
    let mut state = aggregator.connection_state().unwrap();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn telemetry_message_flows_into_a_report() {
    let (transport, aggregator, mut reports) = telemetry_aggregator();
    aggregator.start().await.unwrap();
    connected(&aggregator).await;

    transport.deliver("dev/data/all", json!({ "dev1": "ON" }));
    tokio::time::sleep(Duration::from_secs(7)).await;

    let report = reports.try_recv().unwrap();
    assert_eq!(report.updates[&Domain::Telemetry]["dev"], json!({ "dev1": "ON" }));
    assert_eq!(
        report.state[&Domain::Telemetry].data["dev"],
        json!({ "dev1": "ON" })
    );
    assert!(report.state[&Domain::Telemetry].last_update.is_some());

    aggregator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_telemetry_is_never_fetched() {
    let (_transport, aggregator, mut reports) = telemetry_aggregator();
    aggregator.start().await.unwrap();
    connected(&aggregator).await;

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(reports.try_recv().is_err());
    assert!(aggregator.domain(Domain::Telemetry).last_update.is_none());

    aggregator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn set_states_publishes_a_command() {
    let (transport, aggregator, _reports) = telemetry_aggregator();
    aggregator.start().await.unwrap();
    connected(&aggregator).await;

    transport.deliver("dev/topics", json!({ "switch": ["dev1"] }));
    transport.deliver("dev/data/all", json!({ "dev1": "ON" }));
    // Let the liveness monitor see the messages.
    tokio::time::sleep(Duration::from_millis(4_500)).await;

    let response = aggregator
        .invoke(
            "iot_set_states",
            json!({ "topics": ["dev1"], "states": ["OFF"] }),
        )
        .await;

    assert_eq!(
        response,
        CommandResponse::Ok {
            result: json!({ "dev1": "done" })
        }
    );
    let published = transport.ledger.published.lock().unwrap().clone();
    assert_eq!(
        published,
        vec![(
            "dev/sub".to_owned(),
            json!({ "type": "CMD", "topic_names": ["dev1"], "states": ["OFF"] })
        )]
    );

    aggregator.shutdown().await;
}
