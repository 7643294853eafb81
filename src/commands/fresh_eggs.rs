// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew fresh-eggs`: remove the egg-info of editable installs
//!
//! Console entry points are bootstrapped into the egg-info at install time
//! and are not updated between runs; deleting it forces a refresh on the
//! next `poetry install`.

use super::StewContext;
use crate::styles::{echo, OUTCOME};
use anyhow::Result;

/// Run the command on the projects matching `project_name`, or all of them
///
/// # Errors
///
/// Fails when no project matches, or when a folder cannot be removed.
pub fn run(context: &StewContext, project_name: Option<String>) -> Result<()> {
    echo::step("Removing *.egg-info folders.");

    let mut deleted = false;
    for project in context.discover(project_name, false)? {
        if project.remove_egg_info()? {
            OUTCOME.item().echo(format!("Deleted: {}", project.egg_path().display()));
            deleted = true;
        }
    }

    if deleted {
        echo::suggest("Environments were not refreshed. You may want to call 'poetry install'.");
    }

    echo::success("");
    Ok(())
}
