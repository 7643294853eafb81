// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew ci`: launch the ci runners of the projects on all their environments

use super::StewContext;
use crate::styles::{echo, ExitWithFailure, STEP};
use crate::stew::ci::launch_continuous_integration;
use anyhow::Result;

/// Run the command
///
/// `checks` restricts the runners by name. In ci mode nothing is fixed,
/// `--fix` notwithstanding.
///
/// # Errors
///
/// Failing projects are reported as a controlled failure; runners that
/// cannot complete are reported as errors.
pub fn run(
    context: &StewContext,
    project_name: Option<String>,
    exact_match: bool,
    fix: bool,
    checks: &[String],
) -> Result<()> {
    let auto_fix = if fix && context.config.ci_mode()? {
        echo::warning("Automatic fixes are disabled in ci mode.");
        false
    } else {
        fix
    };

    let mut failures: Vec<String> = Vec::new();
    for project in context.discover(project_name, exact_match)? {
        STEP.with_pad_after(false).echo(&project.package().name);
        if !launch_continuous_integration(&project, auto_fix, checks)? {
            failures.push(project.to_string());
        }
    }

    if !failures.is_empty() {
        return Err(ExitWithFailure::new(format!("{} project(s) failed ci steps.", failures.len()))
            .with_failures(failures)
            .into());
    }

    echo::success("");
    Ok(())
}
