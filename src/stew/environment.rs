// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Python interpreters and the tools installed next to them

use crate::systools::{check_output, find_application, RunOptions};
use once_cell::sync::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tools stew knows how to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PythonTool {
    /// The interpreter itself
    Python,
    /// pip
    Pip,
    /// poetry
    Poetry,
    /// mypy
    Mypy,
    /// black
    Black,
    /// pytest
    Pytest,
}

impl PythonTool {
    /// Executable and module name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Pip => "pip",
            Self::Poetry => "poetry",
            Self::Mypy => "mypy",
            Self::Black => "black",
            Self::Pytest => "pytest",
        }
    }
}

#[cfg(windows)]
const SCRIPTS: &str = "Scripts";
#[cfg(not(windows))]
const SCRIPTS: &str = "bin";

#[cfg(windows)]
fn executable_file(name: &str) -> String {
    format!("{name}.exe")
}

#[cfg(not(windows))]
fn executable_file(name: &str) -> String {
    name.to_string()
}

/// A python interpreter, usually the one of a virtual environment
///
/// Environments are equal when their interpreters are.
#[derive(Debug, Clone)]
pub struct PythonEnvironment {
    root: Option<PathBuf>,
    python_executable: PathBuf,
    version: OnceCell<String>,
}

impl PythonEnvironment {
    /// An environment from its folder or its interpreter
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            let python_executable = path.join(SCRIPTS).join(executable_file("python"));
            return Self {
                root: Some(path),
                python_executable,
                version: OnceCell::new(),
            };
        }

        // <root>/bin/python
        let root = path
            .parent()
            .filter(|scripts| scripts.file_name().is_some_and(|name| name == SCRIPTS))
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        Self {
            root,
            python_executable: path,
            version: OnceCell::new(),
        }
    }

    /// The environment stew itself runs tools from, found on the PATH
    #[must_use]
    pub fn host() -> Self {
        let python = find_application("python3", None)
            .or_else(|| find_application("python", None))
            .unwrap_or_else(|| PathBuf::from("python3"));
        Self {
            root: None,
            python_executable: python,
            version: OnceCell::new(),
        }
    }

    /// The interpreter
    #[must_use]
    pub fn python_executable(&self) -> &Path {
        &self.python_executable
    }

    /// The environment folder, when known
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Path of an executable installed in this environment
    #[must_use]
    pub fn executable(&self, name: &str) -> Option<PathBuf> {
        match &self.root {
            Some(root) => {
                let path = root.join(SCRIPTS).join(executable_file(name));
                path.exists().then_some(path)
            }
            None => find_application(name, None),
        }
    }

    /// Whether a tool is installed as an executable
    #[must_use]
    pub fn has_tool(&self, tool: PythonTool) -> bool {
        (tool == PythonTool::Python && self.python_executable.exists())
            || self.executable(tool.name()).is_some()
    }

    /// Command line calling `tool` with `args`
    ///
    /// Tools without an executable are run as `python -m <tool>`.
    pub fn build_command<I, S>(&self, tool: PythonTool, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let python = self.python_executable.to_string_lossy().into_owned();
        let mut command = match tool {
            PythonTool::Python => vec![python],
            _ => match self.executable(tool.name()) {
                Some(path) => vec![path.to_string_lossy().into_owned()],
                None => vec![python, "-m".to_string(), tool.name().to_string()],
            },
        };
        command.extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        command
    }

    /// Command line calling any executable of this environment
    ///
    /// Falls back to the bare name, resolved through the PATH.
    pub fn build_custom_command<I, S>(&self, name: &str, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let program = self
            .executable(name)
            .map_or_else(|| name.to_string(), |path| path.to_string_lossy().into_owned());
        std::iter::once(program)
            .chain(args.into_iter().map(|arg| arg.as_ref().to_string()))
            .collect()
    }

    /// The interpreter version, such as `3.11.4`, or `unknown`
    pub fn pretty_python_version(&self) -> &str {
        self.version.get_or_init(|| {
            let command = self.build_command(PythonTool::Python, ["--version"]);
            match check_output(&command, &RunOptions::new()) {
                Ok(output) => output.trim_start_matches("Python").trim().to_string(),
                Err(error) => {
                    debug!("cannot obtain the python version of {}: {error}", self);
                    "unknown".to_string()
                }
            }
        })
    }
}

impl PartialEq for PythonEnvironment {
    fn eq(&self, other: &Self) -> bool {
        self.python_executable == other.python_executable
    }
}

impl Eq for PythonEnvironment {}

impl fmt::Display for PythonEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.python_executable.display())
    }
}
