// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! The `pypi` commands: query the versions released on an index

use crate::pypi::{
    compute_next_version, obtain_latest_release, obtain_loose_versions, LooseVersion, PypiError, StrictVersion,
    VersionSource,
};
use crate::styles::{echo, ExitWithFailure, NOISE};
use anyhow::Result;

/// Group used for versions without a dot
const UNCANNY: &str = "uncanny";

/// Print the most recent release, `0.0.0` when there is none
///
/// # Errors
///
/// Fails when the index cannot be queried.
pub fn current_version(source: &dyn VersionSource, package: &str) -> Result<()> {
    let latest = obtain_latest_release(source, package)?.unwrap_or(StrictVersion::new(0, 0, 0));
    echo::passthrough(latest);
    Ok(())
}

/// Print the version to release next
///
/// # Errors
///
/// Fails on an invalid minimum or when the index cannot be queried.
pub fn next_version(source: &dyn VersionSource, package: &str, prerelease: bool, minimum_version: &str) -> Result<()> {
    echo::passthrough(compute_next_version(source, package, prerelease, minimum_version)?);
    Ok(())
}

/// Versions grouped by major version, oldest first, in order of appearance
#[must_use]
pub fn group_by_major(versions: Vec<LooseVersion>) -> Vec<(String, Vec<LooseVersion>)> {
    let mut groups: Vec<(String, Vec<LooseVersion>)> = Vec::new();
    for version in versions {
        let text = version.to_string();
        let group = match text.split_once('.') {
            Some((major, _)) => major.to_string(),
            None => UNCANNY.to_string(),
        };
        match groups.iter_mut().find(|(name, _)| *name == group) {
            Some((_, members)) => members.push(version),
            None => groups.push((group, vec![version])),
        }
    }
    groups
}

/// Print every version of a package, grouped by major version
///
/// # Errors
///
/// Fails when the index cannot be queried.
pub fn versions(source: &dyn VersionSource, package: &str) -> Result<()> {
    for (group, members) in group_by_major(obtain_loose_versions(source, package, true)?) {
        echo::normal(format!("\nVersion {group}:"));
        for version in members {
            NOISE.item().echo(version);
        }
    }
    Ok(())
}

/// Fail when `version` was already released
///
/// # Errors
///
/// An existing version is reported as a controlled failure.
pub fn raise_if_exists(source: &dyn VersionSource, package: &str, version: &str) -> Result<()> {
    match crate::pypi::raise_if_exists(source, package, version) {
        Err(error @ PypiError::VersionExists { .. }) => Err(ExitWithFailure::new(error)
            .with_suggestions(["Bump the version using \"poetry version major|patch|etc\" and retry."])
            .into()),
        other => Ok(other?),
    }
}
