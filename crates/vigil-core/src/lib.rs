// vigil-core: Live-state aggregation between vigil-api and consumers (CLI / decision engines).

pub mod adapters;
pub mod aggregator;
pub mod config;
pub mod consumer;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod liveness;
pub mod model;
pub mod pump;
pub mod store;
pub mod stream;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregator::{Aggregator, MediaSource, Sources, TelemetrySource};
pub use config::{AggregatorConfig, Intervals, SupervisorConfig};
pub use consumer::ReportSink;
pub use dispatch::{
    CommandContext, CommandDispatcher, CommandResponse, CommandSpec, ErrorKind, ItemSpec,
    ParamSpec,
};
pub use error::CoreError;
pub use liveness::LivenessRecord;
pub use model::{Diff, Domain, DomainState, PendingUpdate, Report, Snapshot, StateSnapshot};
pub use pump::{CycleOutcome, DomainFetcher};
pub use store::StateStore;
pub use stream::DomainStream;
pub use supervisor::{ConnectionState, ReconnectSupervisor};
