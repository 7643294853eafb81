// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Running external programs with useful failure reports

use super::streams::filter_ansi;
use crate::styles::echo;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

// =========================================================================
// Errors
// =========================================================================

/// Errors raised while running a program
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Nothing left to run once arguments were cleaned up
    #[error("Cannot run an empty command.")]
    EmptyCommand,

    /// A quoted argument was never closed
    #[error("No closing quotation in: {0}")]
    UnbalancedQuotes(String),

    /// The program could not be started at all
    #[error("Cannot start {program}: {source}")]
    Spawn {
        /// The program that failed to start
        program: String,
        /// Why it failed
        #[source]
        source: std::io::Error,
    },

    /// The program ran and reported a failure
    #[error(transparent)]
    Failed(#[from] Box<DetailedProcessError>),
}

/// A non-zero exit, with everything needed to understand it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailedProcessError {
    command: Vec<String>,
    exit_code: Option<i32>,
    stdout: Option<String>,
    stderr: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl DetailedProcessError {
    /// A failure of `command` with the given exit code
    pub fn new(command: Vec<String>, exit_code: Option<i32>) -> Self {
        Self {
            command,
            exit_code,
            stdout: None,
            stderr: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach captured output streams
    #[must_use]
    pub fn with_streams(mut self, stdout: Option<String>, stderr: Option<String>) -> Self {
        self.stdout = stdout.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self.stderr = stderr.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self
    }

    /// Attach a piece of context shown to the user
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// The command line, separated with spaces
    #[must_use]
    pub fn command_str(&self) -> String {
        self.command.join(" ")
    }

    /// The exit code; 1 when the process was killed by a signal
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(1)
    }

    /// Captured standard output
    #[must_use]
    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    /// Captured standard error
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }
}

impl fmt::Display for DetailedProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![format!(
            "Command '{}' returned non-zero exit status {}.\n",
            self.command_str(),
            self.exit_code()
        )];
        lines.extend(self.metadata.iter().map(|(key, value)| format!("{key}: {value}")));
        lines.push(format!("command: {}", self.command_str()));
        lines.push(format!("exit code: {}", self.exit_code()));
        if let Some(stdout) = &self.stdout {
            lines.push(format!("\n--<stdout>--\n{stdout}\n--</stdout>--\n"));
        }
        if let Some(stderr) = &self.stderr {
            lines.push(format!("\n--<stderr>--\n{stderr}\n--</stderr>--\n"));
        }
        f.write_str(&lines.join("\n"))
    }
}

impl std::error::Error for DetailedProcessError {}

// =========================================================================
// Options
// =========================================================================

/// How to run a program
#[derive(Debug, Clone)]
pub struct RunOptions {
    working_directory: PathBuf,
    capture_output: bool,
    verbose: bool,
    quoted: bool,
    env_remove: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from("."),
            capture_output: false,
            verbose: false,
            quoted: false,
            env_remove: Vec::new(),
            env: Vec::new(),
        }
    }
}

impl RunOptions {
    /// Run in the current directory, streams attached to the terminal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run from another directory
    #[must_use]
    pub fn in_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = path.into();
        self
    }

    /// Capture and return standard output
    #[must_use]
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Echo the command line before running it
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Split arguments the way a shell would, keeping quotes
    ///
    /// Lets callers group flags with their values:
    /// `["executable --verbose", "--target 'some file.txt'"]`.
    #[must_use]
    pub fn quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }

    /// Remove a variable from the child's environment
    #[must_use]
    pub fn without_env(mut self, key: impl Into<OsString>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Set a variable in the child's environment
    #[must_use]
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The directory the program runs from
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }
}

// =========================================================================
// Command building
// =========================================================================

/// Clean up arguments: leading whitespace is stripped and blank ones dropped
///
/// With `quoted`, the remaining arguments are joined and split again on
/// whitespace; a token starting with a quote runs until the matching quote,
/// which is kept.
///
/// # Errors
///
/// Fails on an unbalanced quote.
pub fn build_command<I, S>(command: I, quoted: bool) -> Result<Vec<String>, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let converted: Vec<String> = command
        .into_iter()
        .map(|arg| arg.as_ref().trim_start().to_string())
        .filter(|arg| !arg.trim().is_empty())
        .collect();

    if quoted {
        split_quoted(&converted.join(" "))
    } else {
        Ok(converted)
    }
}

fn split_quoted(line: &str) -> Result<Vec<String>, ProcessError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&next) = chars.peek() {
        if next.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if next == '\'' || next == '"' {
            token.push(next);
            chars.next();
            loop {
                match chars.next() {
                    Some(c) if c == next => {
                        token.push(c);
                        break;
                    }
                    Some(c) => token.push(c),
                    None => return Err(ProcessError::UnbalancedQuotes(line.to_string())),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

fn display_command(command: &[String], quoted: bool) -> String {
    if quoted {
        return command.join(" ");
    }
    command
        .iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
                format!("'{}'", arg.replace('\'', r#"'"'"'"#))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// =========================================================================
// Running
// =========================================================================

fn decode(stream: &[u8]) -> String {
    let filtered = filter_ansi(stream);
    match String::from_utf8(filtered) {
        Ok(text) => text.trim().to_string(),
        Err(_) => {
            warn!("An error occurred decoding the output stream; retrying in safe mode.");
            String::from_utf8_lossy(stream).trim().to_string()
        }
    }
}

/// Run a program and fail on a non-zero exit
///
/// Returns the ANSI-filtered, trimmed standard output when `capture_output`
/// is set, `None` otherwise.
///
/// # Errors
///
/// Fails when the command is empty, cannot start, or exits with non-zero.
pub fn check_run<I, S>(command: I, options: &RunOptions) -> Result<Option<String>, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let converted = build_command(command, options.quoted)?;
    let Some((program, arguments)) = converted.split_first() else {
        return Err(ProcessError::EmptyCommand);
    };

    let for_display = display_command(&converted, options.quoted);
    debug!("calling: {} (in {})", for_display, options.working_directory.display());
    if options.verbose {
        echo::noise(format!("calling: {for_display}"));
    }

    let mut process = Command::new(program);
    process.args(arguments).current_dir(&options.working_directory);
    for key in &options.env_remove {
        process.env_remove(key);
    }
    process.envs(options.env.iter().map(|(key, value)| (key, value)));

    let spawn_error = |source| ProcessError::Spawn {
        program: program.clone(),
        source,
    };
    let failure = |code| {
        DetailedProcessError::new(converted.clone(), code)
            .with_metadata("working_directory", options.working_directory.display())
    };

    if options.capture_output {
        let Output { status, stdout, stderr } = process
            .stdin(Stdio::inherit())
            .output()
            .map_err(spawn_error)?;
        if !status.success() {
            let error = failure(status.code())
                .with_streams(Some(decode(&stdout)), Some(decode(&stderr)));
            return Err(Box::new(error).into());
        }
        return Ok(Some(decode(&stdout)));
    }

    let status = process.status().map_err(spawn_error)?;
    if !status.success() {
        return Err(Box::new(failure(status.code())).into());
    }
    Ok(None)
}

/// Run a program with its streams attached to the terminal
///
/// # Errors
///
/// See [`check_run`].
pub fn check_call<I, S>(command: I, options: &RunOptions) -> Result<(), ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    check_run(command, &options.clone().capture_output(false)).map(|_| ())
}

/// Run a program and return its standard output
///
/// # Errors
///
/// See [`check_run`].
pub fn check_output<I, S>(command: I, options: &RunOptions) -> Result<String, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    check_run(command, &options.clone().capture_output(true)).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_WITH_SPACES: &str = "some/file with spaces.txt";

    #[test]
    fn test_build_command_keeps_tokens() {
        let command = ["exec", "--option", "--target", TOKEN_WITH_SPACES];
        assert_eq!(build_command(command, false).unwrap(), command.to_vec());
    }

    #[test]
    fn test_build_command_drops_blanks() {
        let command = ["  which", "", "   ", "git"];
        assert_eq!(build_command(command, false).unwrap(), vec!["which", "git"]);
    }

    #[test]
    fn test_build_command_quoted() {
        assert_eq!(build_command(["which git"], true).unwrap(), vec!["which", "git"]);

        let quoted_target = format!("'{TOKEN_WITH_SPACES}'");
        let command = ["exec --option".to_string(), format!("--target {quoted_target}")];
        assert_eq!(
            build_command(command, true).unwrap(),
            vec!["exec".to_string(), "--option".into(), "--target".into(), quoted_target]
        );
    }

    #[test]
    fn test_build_command_quoted_user_error() {
        let unquoted = format!("exec --option {TOKEN_WITH_SPACES}");
        let built = build_command(["exec".to_string(), format!("--option {TOKEN_WITH_SPACES}")], true);
        assert_eq!(built.unwrap().join(" "), unquoted);
    }

    #[test]
    fn test_unbalanced_quotes() {
        assert!(matches!(
            build_command(["echo 'oops"], true),
            Err(ProcessError::UnbalancedQuotes(_))
        ));
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            check_run(["", " "], &RunOptions::new()),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[test]
    fn test_detailed_error_report() {
        let error = DetailedProcessError::new(vec!["poetry".into(), "check".into()], Some(2))
            .with_metadata("working_directory", "/tmp/project")
            .with_streams(Some("  out  ".into()), Some(String::new()));
        let report = error.to_string();

        assert!(report.starts_with("Command 'poetry check' returned non-zero exit status 2.\n"));
        assert!(report.contains("working_directory: /tmp/project"));
        assert!(report.contains("command: poetry check"));
        assert!(report.contains("exit code: 2"));
        assert!(report.contains("\n--<stdout>--\nout\n--</stdout>--\n"));
        assert!(!report.contains("--<stderr>--"));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_output_and_failures() {
        let output = check_output(["echo", "hello"], &RunOptions::new()).unwrap();
        assert_eq!(output, "hello");

        let env = RunOptions::new().with_env("DEVKIT_MARKER", "42");
        assert_eq!(check_output(["sh", "-c", "echo $DEVKIT_MARKER"], &env).unwrap(), "42");

        match check_output(["sh", "-c", "echo boom >&2; exit 3"], &RunOptions::new()) {
            Err(ProcessError::Failed(error)) => {
                assert_eq!(error.exit_code(), 3);
                assert_eq!(error.stderr(), Some("boom"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
