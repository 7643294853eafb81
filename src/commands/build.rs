// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew build`: store a project and its locked dependencies as wheels
//!
//! The wheels land in `--directory`, or `.wheels` at the repository root
//! (the project folder outside of a repository), ready for
//! `pip install --no-index --find-links`.

use super::StewContext;
use crate::styles::{echo, OUTCOME};
use crate::stew::{offline_publish, PythonEnvironment};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Folder created when `--directory` is not given
pub const DEFAULT_WHEELHOUSE: &str = ".wheels";

/// Run the command
///
/// Without `--python`, every environment of the project is used.
///
/// # Errors
///
/// Fails when the project cannot be found, or when building fails.
pub fn run(
    context: &StewContext,
    project_name: &str,
    directory: Option<PathBuf>,
    python: Option<PathBuf>,
) -> Result<()> {
    let verbose = context.verbose()?;
    let project = context.find(project_name)?;

    let environments = match python {
        Some(python) => vec![PythonEnvironment::new(python)],
        None => project
            .virtual_environments(true)
            .with_context(|| format!("Cannot list the environments of {project}"))?,
    };

    let directory = directory.unwrap_or_else(|| {
        project
            .repo_root()
            .unwrap_or_else(|| project.project_path())
            .join(DEFAULT_WHEELHOUSE)
    });

    echo::step(format!("Building python project {project} in {}", directory.display()));
    for environment in &environments {
        OUTCOME
            .with_pad_before(true)
            .echo(format!("virtual environment: {environment}"));
        offline_publish(&project, &directory, environment, !verbose)?;
    }

    echo::success("");
    Ok(())
}
