//! Subcommand handlers.

pub mod catalog;
pub mod config_cmd;
pub mod invoke;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use vigil_config::Config;
use vigil_core::{Aggregator, ReportSink};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file selected by `--config` / `VIGIL_CONFIG`, else the default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(vigil_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<(Config, PathBuf), CliError> {
    let path = config_file(global);
    let config =
        vigil_config::load_config_from(&path).map_err(|e| CliError::from_config(e, &path))?;
    Ok((config, path))
}

/// Build an aggregator over every configured source. Nothing is started.
pub fn build_aggregator(
    global: &GlobalOpts,
    sink: Arc<dyn ReportSink>,
) -> Result<Aggregator, CliError> {
    let (config, path) = load(global)?;
    let sources =
        vigil_config::build_sources(&config).map_err(|e| CliError::from_config(e, &path))?;
    let core =
        vigil_config::aggregator_config(&config).map_err(|e| CliError::from_config(e, &path))?;
    tracing::debug!(config = %path.display(), "sources built");
    Ok(Aggregator::new(core, sources, sink))
}
