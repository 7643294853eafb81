// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Shell completion scripts

use anyhow::Result;
use clap::Command;
use clap_complete::Shell;
use std::io::{self, Write};

/// Write the completion script of `command` for `shell` to `out`
///
/// # Errors
///
/// Fails when `out` cannot be flushed.
pub fn generate(shell: Shell, command: &mut Command, out: &mut dyn Write) -> Result<()> {
    let name = command.get_name().to_string();
    clap_complete::generate(shell, command, name, out);
    out.flush()?;
    Ok(())
}

/// Print the completion script on stdout
///
/// # Errors
///
/// Fails when stdout is closed.
pub fn run(shell: Shell, command: &mut Command) -> Result<()> {
    generate(shell, command, &mut io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_script_mentions_subcommands() {
        let mut command = Command::new("stew").subcommand(Command::new("locate"));
        let mut out = Vec::new();
        generate(Shell::Bash, &mut command, &mut out).unwrap();
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("stew"));
        assert!(script.contains("locate"));
    }
}
