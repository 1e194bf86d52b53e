//! `vigil invoke`: one command against a briefly running aggregator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use vigil_core::{CommandResponse, ErrorKind, Report};

use crate::cli::{GlobalOpts, InvokeArgs};
use crate::error::{CliError, exit_code};
use crate::output;

pub fn parse_args(raw: &str) -> Result<serde_json::Value, CliError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| CliError::InvalidArgs {
            reason: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(CliError::InvalidArgs {
            reason: "expected a JSON object".into(),
        });
    }
    Ok(value)
}

fn status_error(command: &str, response: &CommandResponse) -> Option<CliError> {
    let (status, exit) = match response {
        CommandResponse::Ok { .. } => return None,
        CommandResponse::Unavailable { .. } => ("unavailable", exit_code::UNAVAILABLE),
        CommandResponse::Error { kind, .. } => match kind {
            ErrorKind::UnknownCommand | ErrorKind::InvalidArguments => {
                ("error", exit_code::USAGE)
            }
            ErrorKind::Failed | ErrorKind::Panicked => ("error", exit_code::GENERAL),
        },
    };
    Some(CliError::CommandFailed {
        command: command.to_owned(),
        status: status.to_owned(),
        exit,
    })
}

pub async fn handle(args: &InvokeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let call_args = parse_args(&args.args)?;

    // Reports are not printed here; dropping the receiver discards them.
    let (sink, _) = mpsc::unbounded_channel::<Report>();
    let aggregator = super::build_aggregator(global, Arc::new(sink))?;

    aggregator.start().await?;
    if args.warmup > 0 {
        tracing::info!(seconds = args.warmup, "warming up sources");
        tokio::time::sleep(Duration::from_secs(args.warmup)).await;
    }

    let response = aggregator.invoke(&args.command, call_args).await;
    aggregator.shutdown().await;

    let rendered = output::render_value(global.output, &response)?;
    output::print_output(&rendered, global.quiet);

    match status_error(&args.command, &response) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
