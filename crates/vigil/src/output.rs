//! Output formatting: table, JSON, YAML.
//!
//! Tables use `tabled`; the structured formats go through serde. JSON
//! lines for `vigil run` bypass all of this and use [`write_json_line`].

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a list of serializable items; `to_row` builds the table view.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        other => render_structured(other, data),
    }
}

/// Render one free-form value. Tables fall back to pretty JSON.
pub fn render_value<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(serde_json::to_string_pretty(data)?),
        other => render_structured(other, data),
    }
}

fn render_structured<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::Table => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| CliError::Core {
            message: format!("YAML serialization failed: {e}"),
        }),
    }
}

/// Print rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// One compact JSON document per line, flushed immediately.
pub fn write_json_line<T: serde::Serialize + ?Sized>(
    out: &mut impl Write,
    data: &T,
) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, data)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
