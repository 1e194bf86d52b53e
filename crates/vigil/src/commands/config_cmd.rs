//! `vigil config path|show`.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&super::config_file(global).display().to_string(), global.quiet);
        }
        ConfigCommand::Show => {
            let (config, path) = super::load(global)?;
            let rendered =
                vigil_config::render(&config).map_err(|e| CliError::from_config(e, &path))?;
            output::print_output(rendered.trim_end(), global.quiet);
        }
    }
    Ok(())
}
