// ── Core error types ──
//
// Domain-level errors from vigil-core. Consumers never see HTTP status
// codes or socket failures directly: the `From<vigil_api::Error>` impl
// translates transport-layer errors into the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Availability ─────────────────────────────────────────────────
    #[error("{domain} source unavailable: {reason}")]
    SourceUnavailable { domain: String, reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // ── Fetch / remote errors ────────────────────────────────────────
    #[error("Fetch failed: {message}")]
    Fetch {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Operation rejected: {message}")]
    Rejected { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn timeout(operation: impl Into<String>, limit: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub(crate) fn unavailable(domain: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<vigil_api::Error> for CoreError {
    fn from(err: vigil_api::Error) -> Self {
        match err {
            vigil_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        operation: e
                            .url()
                            .map_or_else(|| "request".into(), |u| u.path().to_owned()),
                        timeout_ms: 0,
                    }
                } else if e.is_connect() {
                    CoreError::SourceUnavailable {
                        domain: e
                            .url()
                            .and_then(|u| u.host_str().map(str::to_owned))
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Fetch {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            vigil_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            vigil_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            vigil_api::Error::Api {
                service,
                status,
                message,
            } => CoreError::Fetch {
                message: format!("{service}: {message}"),
                status: Some(status),
            },
            vigil_api::Error::SessionConnect(reason) => CoreError::SourceUnavailable {
                domain: "telemetry".into(),
                reason: format!("session connect failed: {reason}"),
            },
            vigil_api::Error::SessionClosed { reason } => CoreError::SourceUnavailable {
                domain: "telemetry".into(),
                reason: format!("session closed: {reason}"),
            },
            vigil_api::Error::Rejected {
                operation,
                topic,
                reason,
            } => CoreError::Rejected {
                message: format!("{operation} on '{topic}': {reason}"),
            },
            vigil_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            vigil_api::Error::Io(e) => CoreError::Fetch {
                message: format!("I/O error: {e}"),
                status: None,
            },
        }
    }
}
