// ── Source adapters ──
//
// Narrow per-domain interfaces over the vigil-api clients, plus the
// `DomainFetcher`s the pumps drive. Everything above this layer talks to
// traits, so tests substitute in-memory sources.

pub mod feed;
pub mod media;
pub mod telemetry;
pub mod workspace;

pub use feed::{FeedFetcher, FeedSource};
pub use media::{MediaAnalyzer, MediaFetcher};
pub use telemetry::{SetOutcome, TelemetryAdapter, TelemetryFetcher};
pub use workspace::{CalendarFetcher, MailFetcher, WorkspaceSource};
