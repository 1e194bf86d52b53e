//! CLI error types with miette diagnostics.
//!
//! Maps config and core errors into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use vigil_config::ConfigError;
use vigil_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const UNAVAILABLE: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration value for {field}: {reason}")]
    #[diagnostic(
        code(vigil::config_invalid),
        help("Fix the value in {path}, or override it with a VIGIL_ environment variable.")
    )]
    InvalidConfig {
        field: String,
        reason: String,
        path: String,
    },

    #[error("No workspace token configured")]
    #[diagnostic(
        code(vigil::no_credentials),
        help(
            "Set [workspace].token_env to an environment variable holding the token,\n\
             store it in the system keyring (service 'vigil', entry 'workspace/token'),\n\
             or set [workspace].token in {path}."
        )
    )]
    NoCredentials { path: String },

    #[error(transparent)]
    #[diagnostic(code(vigil::config))]
    Config(ConfigError),

    // ── Sources ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(vigil::unavailable),
        help("Check that the source is reachable and configured, then retry.")
    )]
    Unavailable { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(vigil::timeout),
        help("Raise the matching timeout under [intervals], or check the source.")
    )]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{message}")]
    #[diagnostic(code(vigil::core))]
    Core { message: String },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Invalid --args: {reason}")]
    #[diagnostic(
        code(vigil::invalid_args),
        help("Pass a JSON object, e.g. --args '{{\"number_of_mail\": 3}}'")
    )]
    InvalidArgs { reason: String },

    #[error("Command '{command}' returned status '{status}'")]
    #[diagnostic(
        code(vigil::command_failed),
        help("Run: vigil commands  to see what is available with this configuration.")
    )]
    CommandFailed {
        command: String,
        status: String,
        exit: i32,
    },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(vigil::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig { .. } | Self::Config(_) | Self::InvalidArgs { .. } => {
                exit_code::USAGE
            }
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Unavailable { .. } => exit_code::UNAVAILABLE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::CommandFailed { exit, .. } => *exit,
            Self::Core { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }

    /// Attach the config file location to config errors.
    pub fn from_config(err: ConfigError, path: &std::path::Path) -> Self {
        let path = path.display().to_string();
        match err {
            ConfigError::Validation { field, reason } => Self::InvalidConfig {
                field,
                reason,
                path,
            },
            ConfigError::NoCredentials => Self::NoCredentials { path },
            other => Self::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SourceUnavailable { .. } => Self::Unavailable {
                message: err.to_string(),
            },
            CoreError::Timeout {
                operation,
                timeout_ms,
            } => Self::Timeout {
                operation,
                timeout_ms,
            },
            other => Self::Core {
                message: other.to_string(),
            },
        }
    }
}
