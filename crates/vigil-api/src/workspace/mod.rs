//! Collaboration-suite client: Gmail messages and Google Calendar events.
//!
//! Bearer-token auth against the public REST endpoints. Token acquisition
//! and refresh happen outside this crate; the client is handed a live
//! access token.

mod models;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{SecondsFormat, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, check_status, parse_json};

pub use models::{CalendarEvent, MailMessage, NewEvent};
use models::{
    EventList, EventTime, InsertEvent, InsertedEvent, MessageList, MessagePart, RawMessage,
    SendRequest,
};

/// Public API bases, used unless overridden.
pub const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me/";
pub const CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3/";

/// Gmail caps a single list page at 500 ids.
const MAX_PAGE: usize = 500;
/// Concurrent message fetches while expanding a list page.
const FETCH_CONCURRENCY: usize = 8;

/// Gmail emits base64url both with and without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Client for the mailbox and calendar REST APIs.
#[derive(Clone)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    gmail_base: Url,
    calendar_base: Url,
    token: SecretString,
}

impl std::fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("gmail_base", &self.gmail_base.as_str())
            .field("calendar_base", &self.calendar_base.as_str())
            .finish_non_exhaustive()
    }
}

impl WorkspaceClient {
    /// Build a client against the public Google endpoints.
    pub fn new(token: SecretString, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(
            transport.build_client()?,
            Url::parse(GMAIL_BASE)?,
            Url::parse(CALENDAR_BASE)?,
            token,
        ))
    }

    /// Build a client from parts. Base URLs must end with `/`.
    pub fn with_client(
        http: reqwest::Client,
        gmail_base: Url,
        calendar_base: Url,
        token: SecretString,
    ) -> Self {
        Self {
            http,
            gmail_base,
            calendar_base,
            token,
        }
    }

    // ── Mail ─────────────────────────────────────────────────────────

    /// Fetch up to `limit` of the most recent messages, newest first.
    pub async fn list_messages(&self, limit: usize) -> Result<Vec<MailMessage>, Error> {
        let ids = self.list_message_ids(limit).await?;
        stream::iter(ids)
            .map(|id| async move { self.get_message(&id).await })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await
    }

    /// Ids of up to `limit` of the most recent messages, newest first.
    pub async fn list_message_ids(&self, limit: usize) -> Result<Vec<String>, Error> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let page_size = (limit - ids.len()).min(MAX_PAGE);
            let mut url = self.gmail_base.join("messages")?;
            url.query_pairs_mut()
                .append_pair("maxResults", &page_size.to_string());
            if let Some(ref token) = page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let resp = self
                .http
                .get(url)
                .bearer_auth(self.token.expose_secret())
                .send()
                .await?;
            let page: MessageList = parse_json(check_status("gmail", resp).await?).await?;

            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        ids.truncate(limit);
        debug!(count = ids.len(), "listed mailbox message ids");
        Ok(ids)
    }

    /// One message with its plain-text body.
    pub async fn get_message(&self, id: &str) -> Result<MailMessage, Error> {
        let mut url = self.gmail_base.join(&format!("messages/{id}"))?;
        url.query_pairs_mut().append_pair("format", "full");

        let resp = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        let raw: RawMessage = parse_json(check_status("gmail", resp).await?).await?;

        Ok(MailMessage {
            from: header(&raw.payload, "from").unwrap_or_else(|| "(No sender)".into()),
            subject: header(&raw.payload, "subject").unwrap_or_else(|| "(No subject)".into()),
            body: plain_body(&raw.payload).unwrap_or_else(|| "(No body)".into()),
            id: raw.id,
        })
    }

    /// Send a plain-text message.
    pub async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<(), Error> {
        let rfc822 = format!(
            "To: {to}\r\nSubject: {subject}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{body}"
        );
        let request = SendRequest {
            raw: base64::engine::general_purpose::URL_SAFE.encode(rfc822.as_bytes()),
        };

        let resp = self
            .http
            .post(self.gmail_base.join("messages/send")?)
            .bearer_auth(self.token.expose_secret())
            .json(&request)
            .send()
            .await?;
        check_status("gmail", resp).await?;
        debug!(to, "message sent");
        Ok(())
    }

    // ── Calendar ─────────────────────────────────────────────────────

    /// Fetch up to `limit` upcoming events on the primary calendar.
    pub async fn list_events(&self, limit: usize) -> Result<Vec<CalendarEvent>, Error> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut url = self.calendar_base.join("calendars/primary/events")?;
        url.query_pairs_mut()
            .append_pair("timeMin", &now)
            .append_pair("maxResults", &limit.to_string())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let resp = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        let list: EventList = parse_json(check_status("calendar", resp).await?).await?;
        Ok(list.items.into_iter().map(CalendarEvent::from).collect())
    }

    /// Create an event on the primary calendar, returning its web link.
    pub async fn insert_event(&self, event: &NewEvent) -> Result<Option<String>, Error> {
        let body = InsertEvent {
            summary: &event.summary,
            location: event.location.as_deref(),
            description: event.description.as_deref(),
            start: EventTime::utc(event.start),
            end: EventTime::utc(event.end),
        };

        let resp = self
            .http
            .post(self.calendar_base.join("calendars/primary/events")?)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let inserted: InsertedEvent = parse_json(check_status("calendar", resp).await?).await?;
        Ok(inserted.html_link)
    }
}

// ── Message decoding ─────────────────────────────────────────────────

fn header(part: &MessagePart, name: &str) -> Option<String> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// First `text/plain` part, falling back to the top-level body.
fn plain_body(part: &MessagePart) -> Option<String> {
    let data = if part.parts.is_empty() {
        part.body.data.as_deref()
    } else {
        part.parts
            .iter()
            .find(|p| p.mime_type == "text/plain")
            .and_then(|p| p.body.data.as_deref())
    }?;

    let bytes = BODY_ENGINE.decode(data).ok()?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn part(json: serde_json::Value) -> MessagePart {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let p = part(serde_json::json!({
            "headers": [{ "name": "Subject", "value": "Lunch" }]
        }));
        assert_eq!(header(&p, "subject").as_deref(), Some("Lunch"));
        assert!(header(&p, "from").is_none());
    }

    #[test]
    fn plain_body_prefers_text_part() {
        let p = part(serde_json::json!({
            "mimeType": "multipart/alternative",
            "parts": [
                { "mimeType": "text/html", "body": { "data": "PGI-aGk8L2I-" } },
                { "mimeType": "text/plain", "body": { "data": "aGVsbG8gdGhlcmU" } }
            ]
        }));
        assert_eq!(plain_body(&p).as_deref(), Some("hello there"));
    }

    #[test]
    fn plain_body_falls_back_to_top_level() {
        let p = part(serde_json::json!({
            "mimeType": "text/plain",
            "body": { "data": "aGk=" }
        }));
        assert_eq!(plain_body(&p).as_deref(), Some("hi"));
    }

    #[test]
    fn plain_body_missing_is_none() {
        let p = part(serde_json::json!({ "mimeType": "text/plain" }));
        assert!(plain_body(&p).is_none());
    }
}
