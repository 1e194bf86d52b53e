// ── Aggregator ───────────────────────────────────────────────────────
//
// Owns the store, the fan-in queue and every background task. Sources
// that are not configured simply get no pump.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_api::PushTransport;

use crate::adapters::{
    CalendarFetcher, FeedFetcher, FeedSource, MailFetcher, MediaAnalyzer, MediaFetcher,
    TelemetryAdapter, TelemetryFetcher, WorkspaceSource,
};
use crate::config::AggregatorConfig;
use crate::consumer::{ReportSink, consumer_task};
use crate::dispatch::{CommandContext, CommandDispatcher, CommandResponse, CommandSpec};
use crate::error::CoreError;
use crate::liveness::monitor_task;
use crate::model::{Domain, DomainState, PendingUpdate, StateSnapshot};
use crate::pump::{DomainFetcher, pump_task};
use crate::store::StateStore;
use crate::stream::DomainStream;
use crate::supervisor::ConnectionState;

/// Page size for `get_mails` when the caller gives none.
const DEFAULT_MAIL_COUNT: usize = 5;

/// Push session settings for the telemetry domain.
pub struct TelemetrySource {
    pub transport: Arc<dyn PushTransport>,
    /// Thing names; each contributes `{thing}/data/all` and `{thing}/topics`.
    pub things: Vec<String>,
}

/// Directory scan settings for the media domain.
pub struct MediaSource {
    pub directory: PathBuf,
    pub extensions: Vec<String>,
    pub analyzer: Arc<dyn MediaAnalyzer>,
}

/// The sources to aggregate. `None` leaves a domain empty.
#[derive(Default)]
pub struct Sources {
    pub telemetry: Option<TelemetrySource>,
    /// Backs both the mail and calendar domains.
    pub workspace: Option<Arc<dyn WorkspaceSource>>,
    pub feed: Option<Arc<dyn FeedSource>>,
    pub media: Option<MediaSource>,
}

/// Entry point for consumers.
///
/// Cheaply cloneable. Call [`start`](Self::start) once to spawn the
/// background loops and [`shutdown`](Self::shutdown) to stop them.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    config: AggregatorConfig,
    store: Arc<StateStore>,
    telemetry: Option<Arc<TelemetryAdapter>>,
    fetchers: Vec<Arc<dyn DomainFetcher>>,
    dispatcher: CommandDispatcher,
    sink: Arc<dyn ReportSink>,
    queue_tx: mpsc::UnboundedSender<PendingUpdate>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<PendingUpdate>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Aggregator {
    /// Wire up sources. Nothing runs until [`start`](Self::start).
    pub fn new(config: AggregatorConfig, sources: Sources, sink: Arc<dyn ReportSink>) -> Self {
        let store = Arc::new(StateStore::new());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let telemetry = sources.telemetry.map(|t| {
            Arc::new(TelemetryAdapter::new(
                t.transport,
                t.things,
                config.supervisor.clone(),
                config.staleness_threshold,
            ))
        });

        let mut fetchers: Vec<Arc<dyn DomainFetcher>> = Vec::new();
        if let Some(adapter) = &telemetry {
            fetchers.push(Arc::new(TelemetryFetcher(Arc::clone(adapter))));
        }
        if let Some(workspace) = &sources.workspace {
            fetchers.push(Arc::new(MailFetcher {
                source: Arc::clone(workspace),
                limit: config.mailbox_limit,
                call_timeout: config.fetch_timeout,
                budget: config.fetch_timeout,
            }));
            fetchers.push(Arc::new(CalendarFetcher {
                source: Arc::clone(workspace),
                limit: config.calendar_limit,
            }));
        }
        if let Some(feed) = &sources.feed {
            fetchers.push(Arc::new(FeedFetcher(Arc::clone(feed))));
        }
        if let Some(media) = sources.media {
            fetchers.push(Arc::new(MediaFetcher::new(
                media.directory,
                media.extensions,
                media.analyzer,
                config.fetch_timeout,
                config.fetch_timeout,
            )));
        }

        let dispatcher = CommandDispatcher::new(CommandContext {
            store: Arc::clone(&store),
            telemetry: telemetry.clone(),
            workspace: sources.workspace,
            feed: sources.feed,
            default_mail_count: DEFAULT_MAIL_COUNT,
            calendar_limit: config.calendar_limit,
        });

        Self {
            inner: Arc::new(AggregatorInner {
                config,
                store,
                telemetry,
                fetchers,
                dispatcher,
                sink,
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    /// Domains with a configured source, in declaration order.
    pub fn active_domains(&self) -> Vec<Domain> {
        self.inner.fetchers.iter().map(|f| f.domain()).collect()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the push session, liveness monitor, pumps and consumer.
    ///
    /// Fails if called twice or if the configuration has a zero interval.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.inner.config.validate()?;
        let Some(queue_rx) = self.inner.queue_rx.lock().await.take() else {
            return Err(CoreError::Internal("aggregator already started".into()));
        };
        let inner = &self.inner;
        let intervals = &inner.config.intervals;
        let mut handles = inner.task_handles.lock().await;

        if let Some(adapter) = &inner.telemetry {
            handles.push(adapter.spawn(inner.cancel.clone()));
            handles.push(tokio::spawn(monitor_task(
                vec![Arc::clone(adapter.liveness())],
                intervals.liveness_poll,
                inner.cancel.clone(),
            )));
        }

        for fetcher in &inner.fetchers {
            let domain = fetcher.domain();
            debug!(%domain, every = ?intervals.for_domain(domain), "starting pump");
            handles.push(tokio::spawn(pump_task(
                Arc::clone(fetcher),
                Arc::clone(&inner.store),
                inner.queue_tx.clone(),
                intervals.for_domain(domain),
                inner.config.fetch_timeout,
                inner.cancel.clone(),
            )));
        }

        handles.push(tokio::spawn(consumer_task(
            queue_rx,
            Arc::clone(&inner.store),
            Arc::clone(&inner.sink),
            intervals.consumer,
            inner.cancel.clone(),
        )));

        info!(domains = ?self.active_domains(), "aggregator started");
        Ok(())
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        debug!("aggregator stopped");
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.store.snapshot()
    }

    pub fn domain(&self, domain: Domain) -> Arc<DomainState> {
        self.inner.store.get(domain)
    }

    pub fn subscribe(&self, domain: Domain) -> DomainStream {
        self.inner.store.subscribe(domain)
    }

    /// Push session state, if telemetry is configured.
    pub fn connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.inner
            .telemetry
            .as_ref()
            .map(|t| t.supervisor().watch_state())
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> CommandResponse {
        self.inner.dispatcher.invoke(name, args).await
    }

    pub fn catalog(&self) -> Vec<CommandSpec> {
        self.inner.dispatcher.catalog()
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.inner.dispatcher.names()
    }
}
