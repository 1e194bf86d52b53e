//! `vigil run`: the long-running mode.
//!
//! Reports go to stdout as JSON lines. Each stdin line is a JSON request
//! `{"command": ..., "args": {...}}`, answered with one response line.
//! Ctrl-C ends the run; closing stdin only stops request handling.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use vigil_core::{Aggregator, CommandResponse, ErrorKind, Report};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Request {
    command: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// Answer one request line. Malformed lines get an error envelope.
pub async fn answer(aggregator: &Aggregator, line: &str) -> CommandResponse {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => aggregator.invoke(&request.command, request.args).await,
        Err(e) => CommandResponse::Error {
            kind: ErrorKind::InvalidArguments,
            message: format!("malformed request: {e}"),
        },
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (sink, mut reports) = mpsc::unbounded_channel::<Report>();
    let aggregator = super::build_aggregator(global, Arc::new(sink))?;
    aggregator.start().await?;
    tracing::info!("running; send JSON requests on stdin, Ctrl-C to stop");

    let mut requests = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                tracing::info!("interrupt received, shutting down");
                break signal.map_err(CliError::from);
            }
            Some(report) = reports.recv() => {
                if let Err(e) = output::write_json_line(&mut std::io::stdout().lock(), &report) {
                    break Err(e);
                }
            }
            line = requests.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let response = answer(&aggregator, &line).await;
                    let mut stdout = std::io::stdout().lock();
                    if let Err(e) = output::write_json_line(&mut stdout, &response) {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed; reports continue until interrupted");
                    stdin_open = false;
                }
                Err(e) => break Err(CliError::from(e)),
            },
        }
    };

    aggregator.shutdown().await;
    result
}
