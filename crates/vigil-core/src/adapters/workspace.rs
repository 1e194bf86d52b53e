// ── Collaboration suite: mailbox and calendar ──

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};
use vigil_api::{CalendarEvent, MailMessage, NewEvent, WorkspaceClient};

use crate::error::CoreError;
use crate::model::{Domain, Snapshot};
use crate::pump::DomainFetcher;

/// Mailbox and calendar access.
#[async_trait]
pub trait WorkspaceSource: Send + Sync {
    /// Most recent messages, newest first.
    async fn get_mailbox(&self, limit: usize) -> Result<Vec<MailMessage>, CoreError>;

    /// Ids of the most recent messages, newest first.
    async fn mailbox_ids(&self, limit: usize) -> Result<Vec<String>, CoreError>;

    /// One message by id.
    async fn get_mail(&self, id: &str) -> Result<MailMessage, CoreError>;

    /// Upcoming events, soonest first.
    async fn get_calendar(&self, limit: usize) -> Result<Vec<CalendarEvent>, CoreError>;

    /// Send a plain-text message. `Ok(false)` means the provider declined.
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<bool, CoreError>;

    /// Create an event, returning its link if the provider gives one.
    async fn create_event(&self, event: &NewEvent) -> Result<Option<String>, CoreError>;
}

#[async_trait]
impl WorkspaceSource for WorkspaceClient {
    async fn get_mailbox(&self, limit: usize) -> Result<Vec<MailMessage>, CoreError> {
        Ok(self.list_messages(limit).await?)
    }

    async fn mailbox_ids(&self, limit: usize) -> Result<Vec<String>, CoreError> {
        Ok(self.list_message_ids(limit).await?)
    }

    async fn get_mail(&self, id: &str) -> Result<MailMessage, CoreError> {
        Ok(self.get_message(id).await?)
    }

    async fn get_calendar(&self, limit: usize) -> Result<Vec<CalendarEvent>, CoreError> {
        Ok(self.list_events(limit).await?)
    }

    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<bool, CoreError> {
        WorkspaceClient::send_message(self, to, subject, body).await?;
        Ok(true)
    }

    async fn create_event(&self, event: &NewEvent) -> Result<Option<String>, CoreError> {
        Ok(self.insert_event(event).await?)
    }
}

/// Snapshot value for one message.
pub fn mail_entry(message: &MailMessage) -> serde_json::Value {
    json!({
        "from": message.from,
        "subject": message.subject,
        "body": message.body,
    })
}

/// Snapshot value for one event.
pub fn event_entry(event: &CalendarEvent) -> serde_json::Value {
    json!({
        "summary": event.summary,
        "start": event.start,
    })
}

/// Messages fetched side by side within one mail cycle.
const MAIL_CONCURRENCY: usize = 8;

/// Mail domain: message id → `{from, subject, body}`.
///
/// Messages already in the store are reused; only new ids are fetched,
/// each under its own deadline, and a cycle stops starting new batches
/// once its budget is spent. A large mailbox fills in over several cycles.
pub struct MailFetcher {
    pub source: Arc<dyn WorkspaceSource>,
    pub limit: usize,
    /// Deadline for the id listing and for each message.
    pub call_timeout: Duration,
    pub budget: Duration,
}

impl MailFetcher {
    async fn get_one(&self, id: &str) -> Option<MailMessage> {
        match tokio::time::timeout(self.call_timeout, self.source.get_mail(id)).await {
            Ok(Ok(message)) => Some(message),
            Ok(Err(e)) => {
                warn!(id, error = %e, "message fetch failed");
                None
            }
            Err(_) => {
                warn!(id, "message fetch timed out");
                None
            }
        }
    }
}

#[async_trait]
impl DomainFetcher for MailFetcher {
    fn domain(&self) -> Domain {
        Domain::Mail
    }

    fn deadline(&self, _default: Duration) -> Option<Duration> {
        None
    }

    async fn fetch(&self, previous: &Snapshot) -> Result<Snapshot, CoreError> {
        let ids = tokio::time::timeout(self.call_timeout, self.source.mailbox_ids(self.limit))
            .await
            .map_err(|_| CoreError::timeout("mailbox listing", self.call_timeout))??;

        let mut next = Snapshot::new();
        let mut missing = Vec::new();
        for id in ids {
            match previous.get(&id) {
                Some(entry) => {
                    next.insert(id, entry.clone());
                }
                None => missing.push(id),
            }
        }

        let started = Instant::now();
        for (batch, chunk) in missing.chunks(MAIL_CONCURRENCY).enumerate() {
            if started.elapsed() >= self.budget {
                let left = missing.len() - batch * MAIL_CONCURRENCY;
                debug!(left, "mail budget spent, resuming next cycle");
                break;
            }
            let fetched = join_all(chunk.iter().map(|id| self.get_one(id))).await;
            for message in fetched.into_iter().flatten() {
                next.insert(message.id.clone(), mail_entry(&message));
            }
        }

        Ok(next)
    }
}

/// Calendar domain: event id → `{summary, start}`.
pub struct CalendarFetcher {
    pub source: Arc<dyn WorkspaceSource>,
    pub limit: usize,
}

#[async_trait]
impl DomainFetcher for CalendarFetcher {
    fn domain(&self) -> Domain {
        Domain::Calendar
    }

    async fn fetch(&self, _previous: &Snapshot) -> Result<Snapshot, CoreError> {
        let events = self.source.get_calendar(self.limit).await?;
        Ok(events
            .iter()
            .map(|e| (e.id.clone(), event_entry(e)))
            .collect())
    }
}
