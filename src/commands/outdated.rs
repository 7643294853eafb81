// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew check-outdated` and `stew fix-outdated`

use super::pull_dev_requirements::pull_all;
use super::{count_or_no, echo_updated, StewContext};
use crate::styles::{echo, ExitWithFailure, NOISE};
use crate::stew::{order_by_local_dependencies, StewError};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Fail when a lock file is missing or out of sync with its `pyproject.toml`
///
/// Pydev projects are analyzed without writing anything.
///
/// # Errors
///
/// Outdated files are reported as a controlled failure.
pub fn check(context: &StewContext) -> Result<()> {
    let verbose = context.verbose()?;
    echo::step("Analyzing all pyproject.toml files and artifacts:");

    let mut outdated: BTreeSet<PathBuf> = BTreeSet::new();
    for project in context.discover(None, false)? {
        NOISE.item().echo(&project);
        if !project.lock_path().exists() || project.lock_is_outdated()? {
            outdated.insert(project.lock_path().to_path_buf());
        }
    }

    match pull_all(context, verbose, true) {
        Ok(paths) => outdated.extend(paths),
        Err(StewError::PythonProjectNotFound(reason)) => debug!("{reason}"),
        Err(error) => return Err(error.into()),
    }

    if !outdated.is_empty() {
        return Err(ExitWithFailure::new(format!("Found {} outdated file(s).", outdated.len()))
            .with_failures(outdated.iter().map(|path| path.display()))
            .with_suggestions(["Run \"stew fix-outdated\" to update all outdated files."])
            .into());
    }

    echo::success("Check complete! All files are up-to-date.");
    Ok(())
}

/// Lock the projects whose lock is outdated, then update pydev projects
///
/// The updated files are listed even when something fails midway.
///
/// # Errors
///
/// Fails when no project is found or when poetry fails.
pub fn fix(context: &StewContext) -> Result<()> {
    let verbose = context.verbose()?;
    let dry_run = context.config.dry_run()?;
    echo::step("Synchronizing all outdated lock files:");

    let mut updated: Vec<PathBuf> = Vec::new();
    let outcome = synchronize(context, verbose, dry_run, &mut updated);
    echo_updated(&updated);
    outcome?;

    echo::success(format!("Update complete! {} file(s) were modified.\n", count_or_no(updated.len())));
    Ok(())
}

fn synchronize(context: &StewContext, verbose: bool, dry_run: bool, updated: &mut Vec<PathBuf>) -> Result<()> {
    // dependencies are locked before their dependents
    for project in order_by_local_dependencies(context.discover(None, false)?)? {
        NOISE.item().echo(&project);
        if dry_run {
            if !project.lock_path().exists() || project.lock_is_outdated()? {
                updated.push(project.lock_path().to_path_buf());
            }
        } else if project.lock_if_needed()? {
            updated.push(project.lock_path().to_path_buf());
        }
    }

    match pull_all(context, verbose, dry_run) {
        Ok(paths) => updated.extend(paths),
        Err(StewError::PythonProjectNotFound(reason)) => debug!("{reason}"),
        Err(error) => return Err(error.into()),
    }
    Ok(())
}
