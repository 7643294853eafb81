// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Continuous integration: runners launched on every environment of a project

mod config;
mod report;
mod runners;
mod status;

pub use config::CiConfig;
pub use report::{render_junit_report, write_junit_report, TestCase};
pub use runners::{
    AnyRunner, BlackRunner, CheckOutdatedRunner, CiRunner, MypyRunner, OfflineBuildRunner,
    PoetryCheckRunner, PytestRunner, WorkingDirectoryKind,
};
pub use status::RunnerStatus;

use super::environment::PythonEnvironment;
use super::project::PythonProject;
use super::StewError;
use crate::flex::lookup_key;
use crate::styles::{echo, NORMAL, WARNING};
use crate::systools::ProcessError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Folder of the reports, inside the project
pub const REPORT_FOLDER: &str = ".ci";

/// What a runner operates on
#[derive(Debug)]
pub struct RunnerContext<'a> {
    /// The project under test
    pub project: &'a PythonProject,
    /// The environment the checks run in
    pub environment: &'a PythonEnvironment,
    /// Where the JUnit report goes
    pub report_path: PathBuf,
}

impl<'a> RunnerContext<'a> {
    /// The context of `runner`, with its report at `.ci/<runner>.<python version>.xml`
    pub fn new(project: &'a PythonProject, environment: &'a PythonEnvironment, runner: &str) -> Self {
        let report_path = project
            .project_path()
            .join(REPORT_FOLDER)
            .join(format!("{runner}.{}.xml", environment.pretty_python_version()));
        Self {
            project,
            environment,
            report_path,
        }
    }
}

/// Launch one runner: the auto-fix first when requested, then the check
///
/// Returns the status and the output worth showing.
///
/// # Errors
///
/// Process failures other than the runner's check-failed exit codes.
pub fn launch_runner(
    runner: &dyn CiRunner,
    context: &RunnerContext<'_>,
    auto_fix: bool,
) -> Result<(RunnerStatus, Vec<String>), StewError> {
    let mut output = Vec::new();
    if let Some(folder) = context.report_path.parent() {
        std::fs::create_dir_all(folder).map_err(StewError::io("Cannot create", folder))?;
    }

    if auto_fix && runner.supports_auto_fix() {
        debug!("{}: auto-fixing", runner.name());
        runner.auto_fix(context, &mut output)?;
    }

    let status = match runner.check(context, &mut output) {
        Ok(status) => status,
        Err(StewError::Process(ProcessError::Failed(failure)))
            if runner.check_failed_exit_codes().contains(&failure.exit_code()) =>
        {
            output.extend(failure.stdout().into_iter().flat_map(str::lines).map(ToString::to_string));
            output.extend(failure.stderr().into_iter().flat_map(str::lines).map(ToString::to_string));
            RunnerStatus::CheckFailed
        }
        Err(error) => return Err(error),
    };

    if !runner.outputs_own_report() {
        let case = TestCase::new(runner.name(), &context.project.package().name, status, &output);
        write_junit_report(&context.report_path, runner.name(), &[case])?;
    }
    Ok((status, output))
}

/// Whether `runner` was selected by `checks`; none selects all
fn is_selected(runner: &dyn CiRunner, checks: &[String]) -> bool {
    checks.is_empty() || checks.iter().any(|check| lookup_key(check) == lookup_key(runner.name()))
}

/// Launch the runners of a project on each of its environments
///
/// Returns whether every runner succeeded everywhere.
///
/// # Errors
///
/// When runners fail to complete, the first error once all of them ran.
pub fn launch_continuous_integration(project: &PythonProject, auto_fix: bool, checks: &[String]) -> Result<bool, StewError> {
    if project.ci().disabled() {
        info!("ci is disabled for {}", project.package().name);
        return Ok(true);
    }

    let environments = project.virtual_environments(true)?;
    let mut errors: Vec<StewError> = Vec::new();
    let mut all_passed = true;

    for runner in project.ci().runners().filter(|runner| is_selected(runner.as_ref(), checks)) {
        for environment in &environments {
            let context = RunnerContext::new(project, environment, runner.name());
            NORMAL
                .with_emoji("hourglass")
                .echo(format!("{} ({})", runner.name(), environment.pretty_python_version()));

            match launch_runner(runner.as_ref(), &context, auto_fix) {
                Ok((RunnerStatus::Success, _)) => {}
                Ok((_, output)) => {
                    all_passed = false;
                    WARNING
                        .with_pad_before(false)
                        .with_pad_after(false)
                        .echo(format!("{}: {} reported issues:", project.package().name, runner.name()));
                    runner.echo_failures(&context, &output);
                }
                Err(error) => {
                    all_passed = false;
                    echo::error(format!(
                        "The ci runner {} failed to complete due to an environment or configuration error.",
                        runner.name()
                    ));
                    errors.push(error);
                }
            }
        }
    }

    if errors.len() > 1 {
        echo::warning(format!("{} exceptions found; raising first one.", errors.len()));
    }
    match errors.into_iter().next() {
        Some(error) => Err(error),
        None => Ok(all_passed),
    }
}
