// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew bump`: update the locked versions of every project

use super::{count_or_no, echo_updated, StewContext};
use crate::styles::echo;
use crate::stew::order_by_local_dependencies;
use anyhow::Result;
use std::path::PathBuf;

/// Run the command
///
/// # Errors
///
/// Fails when no project is found or when poetry fails.
pub fn run(context: &StewContext) -> Result<()> {
    let mut updated: Vec<PathBuf> = Vec::new();
    let outcome = bump_all(context, &mut updated);
    echo_updated(&updated);
    outcome?;

    echo::success(format!("Bump complete! {} file(s) were modified.", count_or_no(updated.len())));
    Ok(())
}

fn bump_all(context: &StewContext, updated: &mut Vec<PathBuf>) -> Result<()> {
    for project in order_by_local_dependencies(context.discover(None, false)?)? {
        echo::step(format!("Bumping {}", project.lock_path().display()));
        if project.bump()? {
            updated.push(project.toml_path().to_path_buf());
        }
    }
    Ok(())
}
