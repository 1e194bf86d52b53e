// ── Runtime aggregation configuration ──
//
// Loop cadences, liveness tuning and per-call deadlines. The config crate
// builds an `AggregatorConfig` and hands it in; core never reads files.

use std::time::Duration;

use crate::error::CoreError;
use crate::model::Domain;

/// Refresh cadence for each background loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervals {
    pub telemetry: Duration,
    pub mail: Duration,
    pub calendar: Duration,
    pub feed: Duration,
    pub media: Duration,
    /// How often the consumer drains the fan-in queue.
    pub consumer: Duration,
    /// How often liveness is recomputed.
    pub liveness_poll: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            telemetry: Duration::from_secs(1),
            mail: Duration::from_secs(60),
            calendar: Duration::from_secs(60),
            feed: Duration::from_secs(600),
            media: Duration::from_secs(5),
            consumer: Duration::from_secs(2),
            liveness_poll: Duration::from_secs(4),
        }
    }
}

impl Intervals {
    pub fn for_domain(&self, domain: Domain) -> Duration {
        match domain {
            Domain::Telemetry => self.telemetry,
            Domain::Mail => self.mail,
            Domain::Calendar => self.calendar,
            Domain::Feed => self.feed,
            Domain::Media => self.media,
        }
    }
}

/// Reconnect tuning for a push session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Deadline for opening a session.
    pub connect_timeout: Duration,
    /// Deadline for each subscribe / unsubscribe / publish round-trip.
    pub operation_timeout: Duration,
    /// First reconnect delay; doubles per failed attempt.
    pub backoff_initial: Duration,
    /// Upper bound on the reconnect delay (before jitter).
    pub backoff_max: Duration,
    /// Attempts per topic before the session is abandoned and rebuilt.
    pub subscribe_attempts: u32,
    /// A session that stays connected this long resets the backoff.
    pub stable_after: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            subscribe_attempts: 3,
            stable_after: Duration::from_secs(30),
        }
    }
}

/// Everything the aggregator needs besides its sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub intervals: Intervals,
    /// Silence longer than this marks a push source disconnected.
    pub staleness_threshold: Duration,
    /// Deadline for one pull fetch.
    pub fetch_timeout: Duration,
    pub supervisor: SupervisorConfig,
    /// Messages pulled per mailbox refresh.
    pub mailbox_limit: usize,
    /// Events pulled per calendar refresh.
    pub calendar_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            intervals: Intervals::default(),
            staleness_threshold: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
            supervisor: SupervisorConfig::default(),
            mailbox_limit: 1000,
            calendar_limit: 100,
        }
    }
}

impl AggregatorConfig {
    /// Reject settings the background loops cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let i = &self.intervals;
        let periods = [
            ("intervals.telemetry", i.telemetry),
            ("intervals.mail", i.mail),
            ("intervals.calendar", i.calendar),
            ("intervals.feed", i.feed),
            ("intervals.media", i.media),
            ("intervals.consumer", i.consumer),
            ("intervals.liveness_poll", i.liveness_poll),
        ];
        match periods.iter().find(|(_, every)| every.is_zero()) {
            Some((name, _)) => Err(CoreError::Config {
                message: format!("{name} must be greater than zero"),
            }),
            None => Ok(()),
        }
    }
}
