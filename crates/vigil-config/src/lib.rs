//! Configuration for vigil.
//!
//! A TOML file merged with `VIGIL_`-prefixed environment variables,
//! workspace token resolution (env + keyring + plaintext), and translation
//! to `vigil_core::AggregatorConfig` and `vigil_core::Sources`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use vigil_api::{
    FeedClient, InferenceClient, TlsMode, TransportConfig, WorkspaceClient, WsTransport,
};
use vigil_core::{
    AggregatorConfig, Intervals, MediaSource, Sources, SupervisorConfig, TelemetrySource,
};

const KEYRING_SERVICE: &str = "vigil";
const KEYRING_TOKEN_ENTRY: &str = "workspace/token";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no workspace token configured (set token_env, store one in the keyring, or set token)")]
    NoCredentials,

    #[error("failed to build {source_name} client: {reason}")]
    Client { source_name: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration. Every source section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    pub telemetry: Option<TelemetrySection>,
    pub workspace: Option<WorkspaceSection>,
    pub feed: Option<FeedSection>,
    pub media: Option<MediaSection>,

    #[serde(default)]
    pub intervals: IntervalSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// `table` or `json`.
    #[serde(default = "default_output")]
    pub output: String,

    /// HTTP request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accept invalid TLS certificates on every HTTP source.
    #[serde(default)]
    pub insecure: bool,

    /// Custom CA certificate for every HTTP source.
    pub ca_cert: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// Push broker for the telemetry domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelemetrySection {
    /// WebSocket URL of the pub/sub bridge.
    pub endpoint: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Thing names to subscribe to.
    pub things: Vec<String>,
}

fn default_client_id() -> String {
    "vigil".into()
}

/// Mailbox + calendar account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkspaceSection {
    /// Access token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the access token.
    pub token_env: Option<String>,

    /// Override the mail API base (must end with `/`).
    pub gmail_base: Option<String>,

    /// Override the calendar API base (must end with `/`).
    pub calendar_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedSection {
    /// Reference page to scrape.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MediaSection {
    pub directory: PathBuf,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Inference service that analyzes one file per request.
    pub endpoint: String,
}

fn default_extensions() -> Vec<String> {
    vec!["mp4".into()]
}

/// Loop cadences, liveness tuning and limits. Durations in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IntervalSection {
    pub telemetry: u64,
    pub mail: u64,
    pub calendar: u64,
    pub feed: u64,
    pub media: u64,
    pub consumer: u64,
    pub liveness_poll: u64,
    pub staleness_threshold: u64,
    pub fetch_timeout: u64,
    pub connect_timeout: u64,
    pub operation_timeout: u64,
    pub backoff_max: u64,
    pub mailbox_limit: usize,
    pub calendar_limit: usize,
}

impl Default for IntervalSection {
    fn default() -> Self {
        let core = AggregatorConfig::default();
        let secs = |d: Duration| d.as_secs();
        Self {
            telemetry: secs(core.intervals.telemetry),
            mail: secs(core.intervals.mail),
            calendar: secs(core.intervals.calendar),
            feed: secs(core.intervals.feed),
            media: secs(core.intervals.media),
            consumer: secs(core.intervals.consumer),
            liveness_poll: secs(core.intervals.liveness_poll),
            staleness_threshold: secs(core.staleness_threshold),
            fetch_timeout: secs(core.fetch_timeout),
            connect_timeout: secs(core.supervisor.connect_timeout),
            operation_timeout: secs(core.supervisor.operation_timeout),
            backoff_max: secs(core.supervisor.backoff_max),
            mailbox_limit: core.mailbox_limit,
            calendar_limit: core.calendar_limit,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("rs", "vigil", "vigil").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("vigil");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing is fine) merged with `VIGIL_` env vars.
///
/// Nested keys use a double underscore: `VIGIL_INTERVALS__MAIL=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("VIGIL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Copy of `config` safe to print: plaintext secrets masked.
pub fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if let Some(workspace) = shown.workspace.as_mut() {
        if workspace.token.is_some() {
            workspace.token = Some(REDACTED.into());
        }
    }
    shown
}

/// Render `config` as TOML, secrets masked.
pub fn render(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(&redacted(config))?)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the workspace access token: `token_env`, then the system
/// keyring, then plaintext `token`.
pub fn resolve_workspace_token(section: &WorkspaceSection) -> Result<SecretString, ConfigError> {
    resolve_token_from(
        section,
        |name| std::env::var(name).ok(),
        || {
            keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_ENTRY)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_token_from(
    section: &WorkspaceSection,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Named env var
    if let Some(ref env_name) = section.token_env {
        if let Some(val) = env(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Some(secret) = keyring() {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = section.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials)
}

// ── Translation to core types ───────────────────────────────────────

/// Loop cadences and limits for the aggregator.
///
/// Cadences and deadlines must be non-zero.
pub fn aggregator_config(config: &Config) -> Result<AggregatorConfig, ConfigError> {
    let i = &config.intervals;
    let required = [
        ("intervals.telemetry", i.telemetry),
        ("intervals.mail", i.mail),
        ("intervals.calendar", i.calendar),
        ("intervals.feed", i.feed),
        ("intervals.media", i.media),
        ("intervals.consumer", i.consumer),
        ("intervals.liveness_poll", i.liveness_poll),
        ("intervals.fetch_timeout", i.fetch_timeout),
        ("intervals.connect_timeout", i.connect_timeout),
        ("intervals.operation_timeout", i.operation_timeout),
    ];
    if let Some((field, _)) = required.iter().find(|(_, secs)| *secs == 0) {
        return Err(ConfigError::Validation {
            field: (*field).to_owned(),
            reason: "must be greater than zero".into(),
        });
    }

    let secs = Duration::from_secs;
    Ok(AggregatorConfig {
        intervals: Intervals {
            telemetry: secs(i.telemetry),
            mail: secs(i.mail),
            calendar: secs(i.calendar),
            feed: secs(i.feed),
            media: secs(i.media),
            consumer: secs(i.consumer),
            liveness_poll: secs(i.liveness_poll),
        },
        staleness_threshold: secs(i.staleness_threshold),
        fetch_timeout: secs(i.fetch_timeout),
        supervisor: SupervisorConfig {
            connect_timeout: secs(i.connect_timeout),
            operation_timeout: secs(i.operation_timeout),
            backoff_max: secs(i.backoff_max),
            ..SupervisorConfig::default()
        },
        mailbox_limit: i.mailbox_limit,
        calendar_limit: i.calendar_limit,
    })
}

/// Shared HTTP settings from `[defaults]`.
pub fn transport_config(config: &Config) -> TransportConfig {
    let d = &config.defaults;
    let tls = if d.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca) = d.ca_cert {
        TlsMode::CustomCa(ca.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(d.timeout),
        user_agent: None,
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e: url::ParseError| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL {raw:?}: {e}"),
    })
}

fn client_error(source_name: &str) -> impl FnOnce(vigil_api::Error) -> ConfigError + '_ {
    move |e| ConfigError::Client {
        source_name: source_name.into(),
        reason: e.to_string(),
    }
}

/// Build a source for every configured section.
pub fn build_sources(config: &Config) -> Result<Sources, ConfigError> {
    let transport = transport_config(config);
    let mut sources = Sources::default();

    if let Some(ref t) = config.telemetry {
        if t.things.is_empty() {
            return Err(ConfigError::Validation {
                field: "telemetry.things".into(),
                reason: "at least one thing is required".into(),
            });
        }
        let endpoint = parse_url("telemetry.endpoint", &t.endpoint)?;
        sources.telemetry = Some(TelemetrySource {
            transport: Arc::new(WsTransport::new(endpoint, t.client_id.clone())),
            things: t.things.clone(),
        });
    }

    if let Some(ref w) = config.workspace {
        let token = resolve_workspace_token(w)?;
        let client = match (&w.gmail_base, &w.calendar_base) {
            (None, None) => {
                WorkspaceClient::new(token, &transport).map_err(client_error("workspace"))?
            }
            (gmail, calendar) => {
                let http = transport
                    .build_client()
                    .map_err(client_error("workspace"))?;
                let gmail = parse_url(
                    "workspace.gmail_base",
                    gmail.as_deref().unwrap_or(vigil_api::workspace::GMAIL_BASE),
                )?;
                let calendar = parse_url(
                    "workspace.calendar_base",
                    calendar
                        .as_deref()
                        .unwrap_or(vigil_api::workspace::CALENDAR_BASE),
                )?;
                WorkspaceClient::with_client(http, gmail, calendar, token)
            }
        };
        sources.workspace = Some(Arc::new(client));
    }

    if let Some(ref f) = config.feed {
        let url = parse_url("feed.url", &f.url)?;
        let client = FeedClient::new(url, &transport).map_err(client_error("feed"))?;
        sources.feed = Some(Arc::new(client));
    }

    if let Some(ref m) = config.media {
        let endpoint = parse_url("media.endpoint", &m.endpoint)?;
        let analyzer =
            InferenceClient::new(endpoint, &transport).map_err(client_error("media"))?;
        sources.media = Some(MediaSource {
            directory: m.directory.clone(),
            extensions: m.extensions.clone(),
            analyzer: Arc::new(analyzer),
        });
    }

    Ok(sources)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert!(config.telemetry.is_none());
        assert_eq!(config.intervals, IntervalSection::default());
        assert_eq!(aggregator_config(&config).unwrap(), AggregatorConfig::default());
    }

    #[test]
    fn sections_are_parsed() {
        let (_dir, path) = write(
            r#"
            [telemetry]
            endpoint = "wss://bridge.example/ws"
            things = ["kitchen", "garage"]

            [feed]
            url = "https://news.example/"

            [media]
            directory = "/srv/camera"
            endpoint = "http://localhost:8000/analyze"

            [intervals]
            mail = 30
            staleness_threshold = 8
            "#,
        );

        let config = load_config_from(&path).unwrap();

        let telemetry = config.telemetry.as_ref().unwrap();
        assert_eq!(telemetry.client_id, "vigil");
        assert_eq!(telemetry.things, vec!["kitchen", "garage"]);
        assert_eq!(config.media.as_ref().unwrap().extensions, vec!["mp4"]);

        let core = aggregator_config(&config).unwrap();
        assert_eq!(core.intervals.mail, Duration::from_secs(30));
        assert_eq!(core.intervals.feed, Duration::from_secs(600));
        assert_eq!(core.staleness_threshold, Duration::from_secs(8));
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let (_dir, path) = write(
            r#"
            [intervals]
            consumer = 0
            "#,
        );
        let config = load_config_from(&path).unwrap();

        match aggregator_config(&config).unwrap_err() {
            ConfigError::Validation { field, .. } => assert_eq!(field, "intervals.consumer"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn configured_sections_become_sources() {
        let (_dir, path) = write(
            r#"
            [telemetry]
            endpoint = "wss://bridge.example/ws"
            things = ["kitchen"]

            [feed]
            url = "https://news.example/"
            "#,
        );
        let config = load_config_from(&path).unwrap();

        let sources = build_sources(&config).unwrap();

        assert!(sources.telemetry.is_some());
        assert!(sources.feed.is_some());
        assert!(sources.workspace.is_none());
        assert!(sources.media.is_none());
    }

    #[test]
    fn bad_urls_are_rejected() {
        let config = Config {
            feed: Some(FeedSection {
                url: "not a url".into(),
            }),
            ..Config::default()
        };

        let err = build_sources(&config).err().unwrap();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "feed.url"));
    }

    #[test]
    fn telemetry_needs_things() {
        let config = Config {
            telemetry: Some(TelemetrySection {
                endpoint: "wss://bridge.example/ws".into(),
                client_id: default_client_id(),
                things: Vec::new(),
            }),
            ..Config::default()
        };

        assert!(matches!(
            build_sources(&config).err().unwrap(),
            ConfigError::Validation { .. }
        ));
    }

    #[test]
    fn token_resolution_order() {
        let section = WorkspaceSection {
            token: Some("plain".into()),
            token_env: Some("VIGIL_TEST_TOKEN".into()),
            ..WorkspaceSection::default()
        };

        let from_env = resolve_token_from(&section, |_| Some("env".into()), || Some("ring".into()));
        assert_eq!(from_env.unwrap().expose_secret(), "env");

        let from_ring = resolve_token_from(&section, |_| None, || Some("ring".into()));
        assert_eq!(from_ring.unwrap().expose_secret(), "ring");

        let from_file = resolve_token_from(&section, |_| None, || None);
        assert_eq!(from_file.unwrap().expose_secret(), "plain");

        let none = resolve_token_from(&WorkspaceSection::default(), |_| None, || None);
        assert!(matches!(none, Err(ConfigError::NoCredentials)));
    }

    #[test]
    fn render_masks_plaintext_token() {
        let config = Config {
            workspace: Some(WorkspaceSection {
                token: Some("ya29.secret".into()),
                ..WorkspaceSection::default()
            }),
            ..Config::default()
        };

        let shown = render(&config).unwrap();

        assert!(!shown.contains("ya29.secret"));
        assert!(shown.contains(REDACTED));
    }
}
