// ── Telemetry / control channel ──
//
// Push-based: a supervised session delivers `{thing}/data/all` sensor
// dumps and `{thing}/topics` feature maps. Commands go out on
// `{thing}/sub`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vigil_api::{PushMessage, PushTransport};

use crate::config::SupervisorConfig;
use crate::error::CoreError;
use crate::liveness::LivenessRecord;
use crate::model::{Domain, Snapshot};
use crate::pump::DomainFetcher;
use crate::supervisor::ReconnectSupervisor;

const DATA_SUFFIX: &str = "/data/all";
const TOPICS_SUFFIX: &str = "/topics";

/// Result of a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOutcome {
    /// Published to at least one thing.
    Done,
    /// No thing lists the topic, or every publish failed.
    Failed,
}

#[derive(Debug, Default)]
struct Cache {
    /// Latest `{thing}/data/all` payload per thing.
    sensors: BTreeMap<String, Value>,
    /// Latest `{thing}/topics` payload per thing, as received.
    features: BTreeMap<String, Value>,
    /// Controllable topics per thing, flattened from `features`.
    controllable: BTreeMap<String, Vec<String>>,
}

/// Push adapter for a set of telemetry things.
pub struct TelemetryAdapter {
    things: Vec<String>,
    supervisor: Arc<ReconnectSupervisor>,
    liveness: Arc<LivenessRecord>,
    cache: Mutex<Cache>,
}

impl TelemetryAdapter {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        things: Vec<String>,
        supervisor: SupervisorConfig,
        staleness_threshold: Duration,
    ) -> Self {
        let topics = subscription_topics(&things);
        Self {
            things,
            supervisor: Arc::new(ReconnectSupervisor::new(transport, topics, supervisor)),
            liveness: Arc::new(LivenessRecord::new("telemetry", staleness_threshold)),
            cache: Mutex::default(),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn things(&self) -> &[String] {
        &self.things
    }

    pub fn supervisor(&self) -> &Arc<ReconnectSupervisor> {
        &self.supervisor
    }

    pub fn liveness(&self) -> &Arc<LivenessRecord> {
        &self.liveness
    }

    /// Start the supervised session, routing messages into this adapter.
    pub(crate) fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        let supervisor = Arc::clone(&self.supervisor);
        tokio::spawn(supervisor.run(move |message| adapter.handle_message(message), cancel))
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Record a message from the session.
    pub fn handle_message(&self, message: PushMessage) {
        self.liveness.mark_heard();

        let PushMessage { topic, payload } = message;
        if let Some(thing) = topic.strip_suffix(DATA_SUFFIX) {
            self.cache().sensors.insert(thing.to_owned(), payload);
        } else if let Some(thing) = topic.strip_suffix(TOPICS_SUFFIX) {
            let flat = flatten_topics(&payload);
            debug!(thing, topics = flat.len(), "feature topics updated");
            let mut cache = self.cache();
            cache.controllable.insert(thing.to_owned(), flat);
            cache.features.insert(thing.to_owned(), payload);
        } else {
            debug!(%topic, "ignoring message on unexpected topic");
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Latest sensor state, keyed by thing.
    pub fn get_all_data(&self) -> Snapshot {
        self.cache().sensors.clone()
    }

    /// Connected flag from the last liveness poll.
    pub fn get_status(&self) -> bool {
        self.liveness.is_connected()
    }

    /// Feature maps as last advertised by each thing.
    pub fn feature_topics(&self) -> BTreeMap<String, Value> {
        self.cache().features.clone()
    }

    /// Every controllable topic across all things, sorted, deduplicated.
    pub fn controllable_topics(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .cache()
            .controllable
            .values()
            .flatten()
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// Current value of `topic` in the first thing (in configured order)
    /// whose sensor data carries it.
    pub fn get_state(&self, topic: &str) -> Option<Value> {
        let cache = self.cache();
        self.things
            .iter()
            .filter_map(|thing| cache.sensors.get(thing))
            .find_map(|data| data.get(topic).cloned())
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Send `state` to `topic` on every thing that lists it as controllable.
    pub async fn set_item(&self, topic: &str, state: &str) -> SetOutcome {
        let targets: Vec<String> = {
            let cache = self.cache();
            self.things
                .iter()
                .filter(|thing| {
                    cache
                        .controllable
                        .get(*thing)
                        .is_some_and(|topics| topics.iter().any(|t| t == topic))
                })
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            debug!(topic, "no thing advertises this topic");
            return SetOutcome::Failed;
        }

        let command = json!({
            "type": "CMD",
            "topic_names": [topic],
            "states": [state],
        });

        let mut delivered = false;
        for thing in &targets {
            match self.supervisor.publish(&format!("{thing}/sub"), &command).await {
                Ok(()) => delivered = true,
                Err(e) => warn!(thing, topic, error = %e, "control publish failed"),
            }
        }

        if delivered {
            SetOutcome::Done
        } else {
            SetOutcome::Failed
        }
    }
}

/// Topics to hold on every session for the given things.
pub fn subscription_topics(things: &[String]) -> Vec<String> {
    things
        .iter()
        .flat_map(|thing| [format!("{thing}{DATA_SUFFIX}"), format!("{thing}{TOPICS_SUFFIX}")])
        .collect()
}

/// `{feature: [topic, ...], ...}` → `[topic, ...]`. Bare strings count too.
fn flatten_topics(payload: &Value) -> Vec<String> {
    let Some(features) = payload.as_object() else {
        return Vec::new();
    };
    features
        .values()
        .flat_map(|value| match value {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Value::String(topic) => vec![topic.clone()],
            _ => Vec::new(),
        })
        .collect()
}

/// Pull side of the telemetry domain: reads the push cache each cycle.
pub struct TelemetryFetcher(pub Arc<TelemetryAdapter>);

#[async_trait]
impl DomainFetcher for TelemetryFetcher {
    fn domain(&self) -> Domain {
        Domain::Telemetry
    }

    fn ready(&self) -> bool {
        self.0.get_status()
    }

    async fn fetch(&self, _previous: &Snapshot) -> Result<Snapshot, CoreError> {
        Ok(self.0.get_all_data())
    }
}
