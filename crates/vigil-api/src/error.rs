use thiserror::Error;

/// Top-level error type for the `vigil-api` crate.
///
/// Covers every failure mode across the transport surfaces: HTTP clients
/// (mail/calendar, feed, media inference) and push sessions. `vigil-core`
/// maps these into domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote API ──────────────────────────────────────────────────
    /// Structured error returned by a REST API.
    #[error("{service} API error (HTTP {status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    // ── Push sessions ───────────────────────────────────────────────
    /// Session establishment failed.
    #[error("Session connect failed: {0}")]
    SessionConnect(String),

    /// The session went offline while an operation was in flight.
    #[error("Session closed: {reason}")]
    SessionClosed { reason: String },

    /// The broker refused a subscribe/unsubscribe/publish.
    #[error("Broker rejected {operation} on '{topic}': {reason}")]
    Rejected {
        operation: &'static str,
        topic: String,
        reason: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Filesystem access failed (media discovery).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::SessionConnect(_) | Self::SessionClosed { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}
