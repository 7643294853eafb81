// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew pull-dev-requirements`: copy the dev-dependencies of local
//! dependencies into pydev projects

use super::{not_found_as_failure, StewContext};
use crate::styles::echo;
use crate::stew::{discover_pyprojects, is_pydev_project, pull_and_write_dev_requirements, Discovery, StewError};
use anyhow::Result;
use std::path::PathBuf;

/// Update every pydev project of the repository; returns the modified files
///
/// # Errors
///
/// `PythonProjectNotFound` when the repository has no pydev project.
pub(crate) fn pull_all(context: &StewContext, verbose: bool, dry_run: bool) -> Result<Vec<PathBuf>, StewError> {
    let discovery = Discovery::new(context.path.clone()).verbose(verbose);
    let pydev_projects: Vec<_> = discover_pyprojects(&discovery)?
        .into_iter()
        .filter(is_pydev_project)
        .collect();
    if pydev_projects.is_empty() {
        return Err(StewError::PythonProjectNotFound("No pydev projects were found.".to_string()));
    }

    let dry_run_text = if dry_run { "(dry run) " } else { "" };
    let mut updated = Vec::new();
    for project in pydev_projects {
        echo::step(format!("Analyzing dev requirements for {project}"));
        if pull_and_write_dev_requirements(&project, dry_run)? {
            echo::outcome(format!(
                "{dry_run_text}Updated {} with new dev requirements.",
                project.package().name
            ));
            if !dry_run {
                echo::outcome("Lock file and virtual environment updated !!thumbs_up!!\n");
            }
            updated.push(project.toml_path().to_path_buf());
        } else {
            echo::success(format!("{}'s dev requirements were up to date.", project.package().name));
        }
    }
    Ok(updated)
}

/// Run the command
///
/// # Errors
///
/// Fails when there is no pydev project or when poetry fails.
pub fn run(context: &StewContext) -> Result<()> {
    let dry_run = context.config.dry_run()?;
    pull_all(context, context.verbose()?, dry_run).map_err(not_found_as_failure)?;
    Ok(())
}
