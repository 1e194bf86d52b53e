use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

// cli.rs only needs clap + clap_complete, both build-dependencies.
#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir: PathBuf = std::env::var_os("OUT_DIR")
        .ok_or("OUT_DIR not set by Cargo")?
        .into();

    let man_dir = out_dir.join("man");
    let completion_dir = out_dir.join("completions");
    fs::create_dir_all(&man_dir)?;
    fs::create_dir_all(&completion_dir)?;

    let mut cmd = cli::Cli::command();
    write_manpages(&cmd, &man_dir)?;

    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        clap_complete::generate_to(shell, &mut cmd, "vigil", &completion_dir)?;
    }
    Ok(())
}

/// `vigil.1` plus one `vigil-<sub>.1` per visible subcommand, nested
/// subcommands flattened into dashed names.
fn write_manpages(root: &clap::Command, dir: &Path) -> Result<(), Box<dyn Error>> {
    let mut pending = vec![root.clone()];

    while let Some(cmd) = pending.pop() {
        let name = cmd.get_name().to_owned();
        let mut page = Vec::new();
        clap_mangen::Man::new(cmd.clone()).render(&mut page)?;
        fs::write(dir.join(format!("{name}.1")), page)?;

        pending.extend(
            cmd.get_subcommands()
                .filter(|sub| !sub.is_hide_set())
                .map(|sub| sub.clone().name(format!("{name}-{}", sub.get_name()))),
        );
    }
    Ok(())
}
