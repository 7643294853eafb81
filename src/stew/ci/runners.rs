// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! The ci runners: the builtin checks and user-defined commands

use super::status::RunnerStatus;
use super::RunnerContext;
use crate::flex::{deserialize_enum, FlexEnum, OneOrMany};
use crate::stew::environment::{PythonEnvironment, PythonTool};
use crate::stew::offline::offline_publish;
use crate::stew::project::InstallOptions;
use crate::stew::pydev::{is_pydev_project, pull_and_write_dev_requirements};
use crate::stew::StewError;
use crate::styles::echo;
use crate::systools::{
    check_output, find_paths, find_repo_root, safe_text_write, ProcessError, RunOptions, SearchScope,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A check launched on a project, once per virtual environment
pub trait CiRunner: fmt::Debug + Send + Sync {
    /// The runner's name, as used by `stew ci --check`
    fn name(&self) -> &str;

    /// Exit codes meaning "the check found issues" rather than "the check broke"
    fn check_failed_exit_codes(&self) -> &[i32] {
        &[1]
    }

    /// Whether the tool writes the JUnit report itself
    fn outputs_own_report(&self) -> bool {
        false
    }

    /// Whether [`CiRunner::auto_fix`] does anything
    fn supports_auto_fix(&self) -> bool {
        false
    }

    /// Run the check; lines worth showing go to `output`
    ///
    /// # Errors
    ///
    /// Process failures; the launcher turns the configured exit codes into
    /// [`RunnerStatus::CheckFailed`].
    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError>;

    /// Fix what the check would report
    ///
    /// # Errors
    ///
    /// Process failures.
    fn auto_fix(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<(), StewError> {
        let _ = (context, output);
        Ok(())
    }

    /// Display the output of a failed check
    fn echo_failures(&self, context: &RunnerContext<'_>, output: &[String]) {
        let _ = context;
        for line in output.iter().filter(|line| !line.trim().is_empty()) {
            echo::noise(line);
        }
    }
}

macro_rules! boxed_runner {
    ($($runner:ty),* $(,)?) => {
        $(
            impl From<$runner> for Box<dyn CiRunner> {
                fn from(runner: $runner) -> Self {
                    Box::new(runner)
                }
            }
        )*
    };
}

boxed_runner!(
    MypyRunner,
    BlackRunner,
    PytestRunner,
    PoetryCheckRunner,
    CheckOutdatedRunner,
    OfflineBuildRunner,
    AnyRunner,
);

fn run_in(directory: &Path, verbose: bool) -> RunOptions {
    RunOptions::new().in_directory(directory).verbose(verbose)
}

fn push_lines(output: &mut Vec<String>, text: &str) {
    output.extend(text.lines().map(ToString::to_string));
}

/// `environment` when it has `tool`, else stew's own
fn environment_with(environment: &PythonEnvironment, tool: PythonTool) -> PythonEnvironment {
    if environment.has_tool(tool) {
        environment.clone()
    } else {
        debug!("{environment} has no {}; using stew's", tool.name());
        PythonEnvironment::host()
    }
}

// =========================================================================
// mypy
// =========================================================================

const DEFAULT_MYPY_CONFIG: &str = "\
[mypy]
disallow_untyped_defs = True
disallow_incomplete_defs = True
check_untyped_defs = True
no_implicit_optional = True
warn_redundant_casts = True
warn_unused_ignores = True
warn_return_any = True
strict_equality = True
ignore_missing_imports = True
";

static MYPY_ERROR: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?P<path>.+\.py):(?P<line>\d+):(?P<column>\d+:| )(?:\s?error:\s?)(?P<detail>.+)$").ok()
});

/// Type-checks the folders holding a `py.typed` marker
#[derive(Debug, Default, Deserialize)]
pub struct MypyRunner {}

impl MypyRunner {
    /// The nearest `mypy.ini`, or an opinionated one written next to the reports
    fn config_path(context: &RunnerContext<'_>) -> Result<PathBuf, StewError> {
        let project_path = context.project.project_path();
        if let Some(found) = find_paths(Path::new("mypy.ini"), project_path, SearchScope::everywhere())?
            .into_iter()
            .next()
        {
            return Ok(found);
        }
        let fallback = context
            .report_path
            .parent()
            .unwrap_or(project_path)
            .join("mypy.ini");
        safe_text_write(&fallback, DEFAULT_MYPY_CONFIG, true, false)?;
        Ok(fallback)
    }
}

impl CiRunner for MypyRunner {
    fn name(&self) -> &str {
        "mypy"
    }

    fn outputs_own_report(&self) -> bool {
        true
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        let project = context.project;
        let typed_folders = project.typed_folders();
        if typed_folders.is_empty() {
            output.push("Cannot find a py.typed file: https://www.python.org/dev/peps/pep-0561/".to_string());
            return Ok(RunnerStatus::Error);
        }

        // imports are followed in the project's environment
        project.install(InstallOptions {
            sync: false,
            quiet: true,
        })?;

        let mut args = vec![
            "--python-executable".to_string(),
            context.environment.python_executable().to_string_lossy().into_owned(),
            "--config-file".to_string(),
            Self::config_path(context)?.to_string_lossy().into_owned(),
            "--cache-dir".to_string(),
            project.project_path().join(".mypy_cache").to_string_lossy().into_owned(),
            "--show-error-codes".to_string(),
            format!("--junit-xml={}", context.report_path.display()),
        ];
        args.extend(
            typed_folders
                .iter()
                .filter_map(|folder| folder.file_name())
                .map(|name| name.to_string_lossy().into_owned()),
        );

        let command = environment_with(context.environment, PythonTool::Mypy).build_command(PythonTool::Mypy, args);
        if project.verbose() {
            echo::normal(command.join(" "));
        }
        push_lines(output, &check_output(&command, &run_in(project.project_path(), project.verbose()))?);
        Ok(RunnerStatus::Success)
    }

    fn echo_failures(&self, context: &RunnerContext<'_>, output: &[String]) {
        for line in output {
            match MYPY_ERROR.as_ref().and_then(|pattern| pattern.captures(line)) {
                Some(found) => {
                    let path = context.project.project_path().join(&found["path"]);
                    echo::error_details(format!(
                        "{}:{}:{} {}",
                        path.display(),
                        &found["line"],
                        found["column"].trim_end_matches(':').trim(),
                        &found["detail"]
                    ));
                }
                None => echo::noise(line),
            }
        }
    }
}

// =========================================================================
// black
// =========================================================================

/// Checks the formatting; the auto-fix reformats
#[derive(Debug, Default, Deserialize)]
pub struct BlackRunner {}

impl BlackRunner {
    fn run(context: &RunnerContext<'_>, args: &[&str]) -> Result<String, StewError> {
        let project = context.project;
        let command = environment_with(context.environment, PythonTool::Black)
            .build_command(PythonTool::Black, std::iter::once(".").chain(args.iter().copied()));
        Ok(check_output(&command, &run_in(project.project_path(), project.verbose()))?)
    }

    /// Outcome of a failed quiet check, given the verbose rerun
    ///
    /// A clean rerun does not clear the first failure.
    fn after_rerun(
        first: StewError,
        rerun: Result<String, StewError>,
        output: &mut Vec<String>,
    ) -> Result<RunnerStatus, StewError> {
        match rerun {
            Ok(listing) => {
                push_lines(output, &listing);
                Err(first)
            }
            Err(error) => Err(error),
        }
    }
}

impl CiRunner for BlackRunner {
    fn name(&self) -> &str {
        "black"
    }

    fn supports_auto_fix(&self) -> bool {
        true
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        match Self::run(context, &["--check", "--quiet"]) {
            Ok(_) => Ok(RunnerStatus::Success),
            Err(first @ StewError::Process(ProcessError::Failed(_))) => {
                // again without --quiet, for the list of files
                Self::after_rerun(first, Self::run(context, &["--check"]), output)
            }
            Err(error) => Err(error),
        }
    }

    fn auto_fix(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<(), StewError> {
        push_lines(output, &Self::run(context, &["--quiet"])?);
        Ok(())
    }
}

// =========================================================================
// pytest
// =========================================================================

fn enabled() -> bool {
    true
}

/// Runs the test suite
#[derive(Debug, Deserialize)]
pub struct PytestRunner {
    /// Only run tests matching this marker expression (`-m`)
    #[serde(default)]
    pub marker_expression: Option<String>,
    /// Also run the doctests of the modules
    #[serde(default = "enabled")]
    pub doctest_modules: bool,
}

impl Default for PytestRunner {
    fn default() -> Self {
        Self {
            marker_expression: None,
            doctest_modules: true,
        }
    }
}

/// pytest's exit code when no test was collected
const NO_TESTS_COLLECTED: i32 = 5;

impl CiRunner for PytestRunner {
    fn name(&self) -> &str {
        "pytest"
    }

    fn outputs_own_report(&self) -> bool {
        true
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        let project = context.project;
        project.install(InstallOptions {
            sync: false,
            quiet: true,
        })?;

        let mut args = vec![
            "--durations=5".to_string(),
            "--tb=short".to_string(),
            format!("--junitxml={}", context.report_path.display()),
        ];
        if let Some(expression) = &self.marker_expression {
            args.extend(["-m".to_string(), expression.clone()]);
        }
        if self.doctest_modules {
            args.push("--doctest-modules".to_string());
        }

        let command = context.environment.build_command(PythonTool::Pytest, args);
        match check_output(&command, &run_in(project.project_path(), project.verbose())) {
            Ok(stdout) => {
                push_lines(output, &stdout);
                Ok(RunnerStatus::Success)
            }
            Err(ProcessError::Failed(failure)) if failure.exit_code() == NO_TESTS_COLLECTED => {
                output.push("No tests were collected.".to_string());
                Ok(RunnerStatus::Error)
            }
            Err(error) => Err(error.into()),
        }
    }
}

// =========================================================================
// poetry check
// =========================================================================

/// Validates `pyproject.toml` with `poetry check`
#[derive(Debug, Default, Deserialize)]
pub struct PoetryCheckRunner {}

impl CiRunner for PoetryCheckRunner {
    fn name(&self) -> &str {
        "poetry-check"
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        let stdout = context.project.poetry_run(["check"], true)?.unwrap_or_default();
        push_lines(output, &stdout);
        Ok(RunnerStatus::Success)
    }
}

// =========================================================================
// check-outdated
// =========================================================================

/// Fails when the lock file, or a pydev project's dev-dependencies, are stale
#[derive(Debug, Default, Deserialize)]
pub struct CheckOutdatedRunner {}

impl CiRunner for CheckOutdatedRunner {
    fn name(&self) -> &str {
        "check-outdated"
    }

    fn supports_auto_fix(&self) -> bool {
        true
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        let project = context.project;
        if !project.lock_path().exists() {
            output.push(format!("{} is missing.", project.lock_path().display()));
        } else if project.lock_is_outdated()? {
            output.push(format!("{} is outdated.", project.lock_path().display()));
        }
        if is_pydev_project(project) && pull_and_write_dev_requirements(project, true)? {
            output.push(format!("The dev-dependencies of {} are outdated.", project.toml_path().display()));
        }

        if output.is_empty() {
            Ok(RunnerStatus::Success)
        } else {
            output.push("Run \"stew fix-outdated\" to update all outdated files.".to_string());
            Ok(RunnerStatus::CheckFailed)
        }
    }

    fn auto_fix(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<(), StewError> {
        let project = context.project;
        if is_pydev_project(project) && pull_and_write_dev_requirements(project, false)? {
            output.push(format!("Updated {}", project.toml_path().display()));
        }
        if project.lock_if_needed()? {
            output.push(format!("Updated {}", project.lock_path().display()));
        }
        Ok(())
    }
}

// =========================================================================
// offline-build
// =========================================================================

/// Builds an offline wheelhouse in a scratch folder
#[derive(Debug, Default, Deserialize)]
pub struct OfflineBuildRunner {}

impl CiRunner for OfflineBuildRunner {
    fn name(&self) -> &str {
        "offline-build"
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        let wheelhouse = tempfile::TempDir::new().map_err(StewError::io("Cannot create", std::env::temp_dir()))?;
        offline_publish(context.project, wheelhouse.path(), context.environment, true)?;
        output.push(format!("{} can be installed offline.", context.project.package().name));
        Ok(RunnerStatus::Success)
    }
}

// =========================================================================
// custom runners
// =========================================================================

/// Where a custom runner is launched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkingDirectoryKind {
    /// The project folder
    #[default]
    Project,
    /// The root of the git repository
    Repository,
}

impl FlexEnum for WorkingDirectoryKind {
    fn members() -> &'static [Self] {
        &[Self::Project, Self::Repository]
    }

    fn name(self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Repository => "Repository",
        }
    }

    fn value(self) -> Value {
        match self {
            Self::Project => json!("project"),
            Self::Repository => json!("repository"),
        }
    }
}

fn default_check_failed_exit_codes() -> Vec<i32> {
    vec![1]
}

/// Any executable of the environment, such as `flake8` or `bandit`
///
/// Arguments are split the way a shell would.
#[derive(Debug, Deserialize)]
pub struct AnyRunner {
    /// The executable, also the runner's name
    pub name: String,
    /// Legacy spelling of `check_args`
    #[serde(default)]
    args: Option<OneOrMany<String>>,
    /// Arguments of the check
    #[serde(default)]
    check_args: Option<OneOrMany<String>>,
    /// Arguments of the auto-fix; without them the runner cannot fix
    #[serde(default)]
    autofix_args: Option<OneOrMany<String>>,
    /// Exit codes meaning the check found issues
    #[serde(default = "default_check_failed_exit_codes")]
    check_failed_exit_codes: Vec<i32>,
    /// Write a JUnit report for tools that do not
    #[serde(default)]
    create_generic_report: bool,
    /// Where the executable runs from
    #[serde(default, deserialize_with = "deserialize_enum")]
    working_directory: WorkingDirectoryKind,
}

impl AnyRunner {
    /// Reject contradicting options
    ///
    /// # Errors
    ///
    /// `Usage` when both `args` and `check-args` are given.
    pub fn validate(mut self) -> Result<Self, StewError> {
        if self.args.is_some() && self.check_args.is_some() {
            return Err(StewError::Usage(
                "Cannot use `args` and `check-args` together. They are equivalent, but `args` is deprecated."
                    .to_string(),
            ));
        }
        if let Some(args) = self.args.take() {
            self.check_args = Some(args);
        }
        Ok(self)
    }

    /// Where the executable runs from
    #[must_use]
    pub fn working_directory(&self) -> WorkingDirectoryKind {
        self.working_directory
    }

    /// The check's arguments
    #[must_use]
    pub fn check_args(&self) -> Vec<String> {
        self.check_args.clone().map(OneOrMany::into_vec).unwrap_or_default()
    }

    fn run(&self, context: &RunnerContext<'_>, args: Vec<String>, output: &mut Vec<String>) -> Result<(), StewError> {
        let project = context.project;
        let directory = match self.working_directory {
            WorkingDirectoryKind::Project => project.project_path().to_path_buf(),
            WorkingDirectoryKind::Repository => find_repo_root(project.project_path(), None)?,
        };
        let command = context.environment.build_custom_command(&self.name, args);
        let options = run_in(&directory, project.verbose()).quoted(true);
        push_lines(output, &check_output(&command, &options)?);
        Ok(())
    }
}

impl CiRunner for AnyRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_failed_exit_codes(&self) -> &[i32] {
        &self.check_failed_exit_codes
    }

    fn outputs_own_report(&self) -> bool {
        !self.create_generic_report
    }

    fn supports_auto_fix(&self) -> bool {
        self.autofix_args.is_some()
    }

    fn check(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<RunnerStatus, StewError> {
        self.run(context, self.check_args(), output)?;
        Ok(RunnerStatus::Success)
    }

    fn auto_fix(&self, context: &RunnerContext<'_>, output: &mut Vec<String>) -> Result<(), StewError> {
        match &self.autofix_args {
            Some(args) => self.run(context, args.clone().into_vec(), output),
            None => Ok(()),
        }
    }
}
