//! Completions command - shell completion scripts

use crate::cli::args::Cli;
use crate::error::KilnResult;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

/// Write the completion script for `shell` to stdout
pub fn execute(shell: Shell) -> KilnResult<()> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(shell, &mut command, name, &mut io::stdout());
    Ok(())
}
