// ── Command dispatch ──
//
// A fixed name → handler registry built once at construction. Every
// outcome, including unknown names, bad arguments, handler errors and
// handler panics, comes back as a serializable `CommandResponse`.

mod catalog;
mod handlers;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::adapters::{FeedSource, TelemetryAdapter, WorkspaceSource};
use crate::error::CoreError;
use crate::model::Domain;
use crate::store::StateStore;

pub use catalog::{CommandSpec, ItemSpec, ParamSpec};

// ── Response envelope ────────────────────────────────────────────────

/// Failure categories reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownCommand,
    InvalidArguments,
    Failed,
    Panicked,
}

/// Uniform result of [`CommandDispatcher::invoke`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    Ok {
        result: serde_json::Value,
    },
    Unavailable {
        domain: Domain,
        reason: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl CommandResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

/// What a handler produces on success.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Ok(serde_json::Value),
    /// The domain's source is missing or not live.
    Unavailable { domain: Domain, reason: String },
}

/// Handler failure, converted to a response at the dispatcher boundary.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Failed(#[from] CoreError),
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Sources a handler may touch.
#[derive(Clone)]
pub struct CommandContext {
    pub store: Arc<StateStore>,
    pub telemetry: Option<Arc<TelemetryAdapter>>,
    pub workspace: Option<Arc<dyn WorkspaceSource>>,
    pub feed: Option<Arc<dyn FeedSource>>,
    /// Default page size for `get_mails` when none is given.
    pub default_mail_count: usize,
    pub calendar_limit: usize,
}

type HandlerResult = Result<CommandOutput, CommandError>;
type HandlerFn = fn(Arc<CommandContext>, serde_json::Value) -> BoxFuture<'static, HandlerResult>;

/// Which source a command needs before it is offered in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Telemetry,
    Workspace,
    Feed,
    Always,
}

struct Registration {
    requirement: Requirement,
    handler: HandlerFn,
}

/// Maps command names to handlers.
pub struct CommandDispatcher {
    context: Arc<CommandContext>,
    registry: HashMap<&'static str, Registration>,
}

impl CommandDispatcher {
    pub fn new(context: CommandContext) -> Self {
        let entries: [(&'static str, Requirement, HandlerFn); 8] = [
            ("iot_get_states", Requirement::Telemetry, handlers::iot_get_states),
            ("iot_set_states", Requirement::Telemetry, handlers::iot_set_states),
            ("get_mails", Requirement::Workspace, handlers::get_mails),
            ("send_mail", Requirement::Workspace, handlers::send_mail),
            ("get_events", Requirement::Workspace, handlers::get_events),
            ("set_event", Requirement::Workspace, handlers::set_event),
            ("get_news", Requirement::Feed, handlers::get_news),
            ("get_state", Requirement::Always, handlers::get_state),
        ];

        let registry = entries
            .into_iter()
            .map(|(name, requirement, handler)| {
                (
                    name,
                    Registration {
                        requirement,
                        handler,
                    },
                )
            })
            .collect();

        Self {
            context: Arc::new(context),
            registry,
        }
    }

    /// Run `name` with named JSON arguments.
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> CommandResponse {
        let Some(registration) = self.registry.get(name) else {
            warn!(command = name, "unknown command");
            return CommandResponse::error(
                ErrorKind::UnknownCommand,
                format!("unknown command: {name}"),
            );
        };

        debug!(command = name, "invoking command");
        let future = (registration.handler)(Arc::clone(&self.context), args);

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(CommandOutput::Ok(result))) => CommandResponse::Ok { result },
            Ok(Ok(CommandOutput::Unavailable { domain, reason })) => {
                debug!(command = name, %domain, %reason, "source unavailable");
                CommandResponse::Unavailable { domain, reason }
            }
            Ok(Err(CommandError::InvalidArguments(message))) => {
                CommandResponse::error(ErrorKind::InvalidArguments, message)
            }
            Ok(Err(CommandError::Failed(e))) => {
                warn!(command = name, error = %e, "command failed");
                CommandResponse::error(ErrorKind::Failed, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(command = name, %message, "command handler panicked");
                CommandResponse::error(ErrorKind::Panicked, message)
            }
        }
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.registry.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Declarations for every command whose source is configured.
    pub fn catalog(&self) -> Vec<CommandSpec> {
        let topics = self
            .context
            .telemetry
            .as_ref()
            .map(|t| t.controllable_topics())
            .unwrap_or_default();

        catalog::specs(&topics)
            .into_iter()
            .filter(|spec| {
                self.registry
                    .get(spec.name)
                    .is_some_and(|r| self.is_configured(r.requirement))
            })
            .collect()
    }

    fn is_configured(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Telemetry => self.context.telemetry.is_some(),
            Requirement::Workspace => self.context.workspace.is_some(),
            Requirement::Feed => self.context.feed.is_some(),
            Requirement::Always => true,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".into())
}
