// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew refresh`: rebuild the environments of the projects

use super::StewContext;
use crate::styles::{echo, NORMAL};
use crate::stew::PythonProject;
use anyhow::Result;

fn announce(project: &PythonProject) {
    NORMAL
        .with_emoji("hourglass")
        .with_pad_before(true)
        .with_pad_after(true)
        .echo(project);
}

/// Run the command
///
/// Pydev projects go last since they depend on the others; the one running
/// this command is left alone.
///
/// # Errors
///
/// Fails when no project matches or when poetry fails.
pub fn run(context: &StewContext, project_name: Option<String>, exact_match: bool) -> Result<()> {
    echo::step("Refreshing python project environments...");

    let (pydev_projects, projects): (Vec<PythonProject>, Vec<PythonProject>) = context
        .discover(project_name, exact_match)?
        .into_iter()
        .partition(|project| project.options().pydev);

    for project in &projects {
        announce(project);
        project.refresh()?;
    }

    for project in &pydev_projects {
        announce(project);
        if project.current_environment_belongs_to_project()? {
            echo::warning(format!("Cannot update {project} because it's what we're currently running."));
        } else {
            project.refresh()?;
        }
    }

    echo::success("");
    Ok(())
}
