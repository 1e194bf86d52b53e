// ── Mail / calendar wire and domain types ──

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Domain types handed to vigil-core ───────────────────────────────

/// A mailbox message reduced to the fields the aggregator tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// An upcoming calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    /// RFC 3339 date-time, or a bare date for all-day events.
    pub start: Option<String>,
    pub link: Option<String>,
}

/// Request body for creating a calendar entry. Times are UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location: Option<String>,
    pub description: Option<String>,
}

// ── Gmail wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    pub id: String,
    pub payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessagePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PartBody {
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendRequest {
    pub raw: String,
}

// ── Calendar wire types ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct EventList {
    #[serde(default)]
    pub items: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(rename = "htmlLink")]
    pub html_link: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InsertEvent<'a> {
    pub summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub start: EventTime,
    pub end: EventTime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsertedEvent {
    #[serde(rename = "htmlLink")]
    pub html_link: Option<String>,
}

impl From<RawEvent> for CalendarEvent {
    fn from(raw: RawEvent) -> Self {
        Self {
            id: raw.id,
            summary: raw.summary.unwrap_or_else(|| "(No title)".into()),
            start: raw.start.and_then(|t| t.date_time.or(t.date)),
            link: raw.html_link,
        }
    }
}

impl EventTime {
    pub(crate) fn utc(at: NaiveDateTime) -> Self {
        Self {
            date_time: Some(at.format("%Y-%m-%dT%H:%M:%S").to_string()),
            date: None,
            time_zone: Some("UTC".into()),
        }
    }
}
