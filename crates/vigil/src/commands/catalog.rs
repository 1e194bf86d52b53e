//! `vigil commands`: the catalog for the current configuration.

use std::sync::Arc;

use tabled::Tabled;
use tokio::sync::mpsc;
use vigil_core::{CommandSpec, Report};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct CommandRow {
    #[tabled(rename = "Command")]
    name: &'static str,
    #[tabled(rename = "Arguments")]
    arguments: String,
    #[tabled(rename = "Description")]
    description: &'static str,
}

fn row(spec: &CommandSpec) -> CommandRow {
    let arguments = spec
        .parameters
        .iter()
        .map(|p| {
            if spec.required.contains(&p.name) {
                p.name.to_owned()
            } else {
                format!("[{}]", p.name)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    CommandRow {
        name: spec.name,
        arguments,
        description: spec.description,
    }
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (sink, _) = mpsc::unbounded_channel::<Report>();
    let aggregator = super::build_aggregator(global, Arc::new(sink))?;

    let rendered = output::render_list(global.output, &aggregator.catalog(), row)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
