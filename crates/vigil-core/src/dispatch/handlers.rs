// Command handlers. Each takes named JSON arguments and checks its
// source's availability before doing anything else.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use vigil_api::NewEvent;

use super::{CommandContext, CommandError, CommandOutput, HandlerResult};
use crate::adapters::{FeedSource, TelemetryAdapter, WorkspaceSource, workspace::mail_entry};
use crate::error::CoreError;
use crate::model::Domain;

const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Deserialize named arguments; `null` counts as no arguments.
fn parse<T: DeserializeOwned>(args: Value) -> Result<T, CommandError> {
    let args = if args.is_null() { json!({}) } else { args };
    Ok(serde_json::from_value(args)?)
}

fn unavailable(domain: Domain, reason: &str) -> HandlerResult {
    Ok(CommandOutput::Unavailable {
        domain,
        reason: reason.to_owned(),
    })
}

// ── Availability guards ──────────────────────────────────────────────

fn live_telemetry(ctx: &CommandContext) -> Result<&Arc<TelemetryAdapter>, HandlerResult> {
    let Some(telemetry) = ctx.telemetry.as_ref() else {
        return Err(unavailable(Domain::Telemetry, "telemetry is not configured"));
    };
    if !telemetry.get_status() {
        return Err(unavailable(
            Domain::Telemetry,
            "telemetry system is disconnected",
        ));
    }
    Ok(telemetry)
}

fn workspace(
    ctx: &CommandContext,
    domain: Domain,
) -> Result<&Arc<dyn WorkspaceSource>, HandlerResult> {
    ctx.workspace
        .as_ref()
        .ok_or_else(|| unavailable(domain, "workspace account is not configured"))
}

fn feed(ctx: &CommandContext) -> Result<&Arc<dyn FeedSource>, HandlerResult> {
    ctx.feed
        .as_ref()
        .ok_or_else(|| unavailable(Domain::Feed, "news feed is not configured"))
}

// ── Telemetry ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetStatesArgs {
    topics: Vec<String>,
}

pub(super) fn iot_get_states(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let args: GetStatesArgs = parse(args)?;
        let telemetry = match live_telemetry(&ctx) {
            Ok(t) => t,
            Err(early) => return early,
        };

        let states: BTreeMap<String, Value> = args
            .topics
            .into_iter()
            .map(|topic| {
                let state = telemetry.get_state(&topic).unwrap_or(Value::Null);
                (topic, state)
            })
            .collect();
        Ok(CommandOutput::Ok(json!(states)))
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetStatesArgs {
    topics: Vec<String>,
    states: Vec<String>,
}

pub(super) fn iot_set_states(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let args: SetStatesArgs = parse(args)?;
        if args.topics.len() != args.states.len() {
            return Err(CommandError::InvalidArguments(format!(
                "{} topics but {} states",
                args.topics.len(),
                args.states.len()
            )));
        }
        let telemetry = match live_telemetry(&ctx) {
            Ok(t) => t,
            Err(early) => return early,
        };

        let mut outcomes = BTreeMap::new();
        for (topic, state) in args.topics.into_iter().zip(args.states) {
            let outcome = telemetry.set_item(&topic, &state).await;
            outcomes.insert(topic, outcome);
        }
        Ok(CommandOutput::Ok(json!(outcomes)))
    })
}

// ── Mail ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetMailsArgs {
    id: Option<String>,
    number_of_mail: Option<usize>,
}

pub(super) fn get_mails(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let args: GetMailsArgs = parse(args)?;
        let source = match workspace(&ctx, Domain::Mail) {
            Ok(s) => s,
            Err(early) => return early,
        };
        let known = ctx.store.data(Domain::Mail);

        let emails: Vec<Value> = if let Some(id) = args.id {
            let entry = known.get(&id).ok_or_else(|| {
                CoreError::Fetch {
                    message: format!("no message with id {id}"),
                    status: None,
                }
            })?;
            let mut email = entry.clone();
            email["id"] = Value::String(id);
            vec![email]
        } else {
            let count = args.number_of_mail.unwrap_or(ctx.default_mail_count);
            source
                .get_mailbox(count)
                .await?
                .iter()
                .map(|m| {
                    let mut email = mail_entry(m);
                    email["id"] = Value::String(m.id.clone());
                    email
                })
                .collect()
        };

        Ok(CommandOutput::Ok(json!({
            "total_mails": known.len(),
            "emails": emails,
        })))
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendMailArgs {
    to: String,
    subject: String,
    body: String,
}

pub(super) fn send_mail(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let args: SendMailArgs = parse(args)?;
        let source = match workspace(&ctx, Domain::Mail) {
            Ok(s) => s,
            Err(early) => return early,
        };

        let sent = source
            .send_message(&args.to, &args.subject, &args.body)
            .await?;
        Ok(CommandOutput::Ok(json!({
            "mail_status": if sent { "sent" } else { "failed" },
        })))
    })
}

// ── Calendar ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

pub(super) fn get_events(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let NoArgs {} = parse(args)?;
        let source = match workspace(&ctx, Domain::Calendar) {
            Ok(s) => s,
            Err(early) => return early,
        };

        let events = source.get_calendar(ctx.calendar_limit).await?;
        Ok(CommandOutput::Ok(json!({ "events": events })))
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetEventArgs {
    summary: String,
    start_time: String,
    end_time: String,
    location: Option<String>,
    description: Option<String>,
}

fn parse_time(field: &str, value: &str) -> Result<NaiveDateTime, CommandError> {
    NaiveDateTime::parse_from_str(value, EVENT_TIME_FORMAT).map_err(|e| {
        CommandError::InvalidArguments(format!(
            "{field} must be YYYY-MM-DD HH:MM:SS, got {value:?}: {e}"
        ))
    })
}

pub(super) fn set_event(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let args: SetEventArgs = parse(args)?;
        let start = parse_time("start_time", &args.start_time)?;
        let end = parse_time("end_time", &args.end_time)?;
        if end < start {
            return Err(CommandError::InvalidArguments(
                "end_time is before start_time".into(),
            ));
        }
        let source = match workspace(&ctx, Domain::Calendar) {
            Ok(s) => s,
            Err(early) => return early,
        };

        let event = NewEvent {
            summary: args.summary,
            start,
            end,
            location: args.location,
            description: args.description,
        };
        let result = match source.create_event(&event).await? {
            Some(link) => json!({ "event": "created", "link": link }),
            None => json!({ "event": "failed" }),
        };
        Ok(CommandOutput::Ok(result))
    })
}

// ── Feed ─────────────────────────────────────────────────────────────

pub(super) fn get_news(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let NoArgs {} = parse(args)?;
        let feed = match feed(&ctx) {
            Ok(f) => f,
            Err(early) => return early,
        };

        let source = feed.source();
        let cached = ctx
            .store
            .data(Domain::Feed)
            .get(&source)
            .and_then(Value::as_str)
            .map(str::to_owned);
        let news = match cached {
            Some(text) => text,
            None => feed.get_latest().await?,
        };
        Ok(CommandOutput::Ok(json!({ "source": source, "news": news })))
    })
}

// ── Aggregated state ─────────────────────────────────────────────────

pub(super) fn get_state(
    ctx: Arc<CommandContext>,
    args: Value,
) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move {
        let NoArgs {} = parse(args)?;
        let mut state = serde_json::to_value(ctx.store.snapshot())
            .map_err(|e| CoreError::Internal(format!("state serialization: {e}")))?;
        if let (Some(telemetry), Some(domain)) = (
            &ctx.telemetry,
            state.get_mut("telemetry").and_then(Value::as_object_mut),
        ) {
            domain.insert("features".into(), json!(telemetry.feature_topics()));
        }
        Ok(CommandOutput::Ok(state))
    })
}
