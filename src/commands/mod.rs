// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Command implementations of the `stew` and `pypi` tools

pub mod build;
pub mod bump;
pub mod ci;
pub mod completions;
pub mod fresh_eggs;
pub mod locate;
pub mod outdated;
pub mod pull_dev_requirements;
pub mod pypi;
pub mod refresh;

use crate::config::StewConfig;
use crate::styles::{ExitWithFailure, NOISE, OUTCOME};
use crate::stew::{discover_pyprojects, find_pyproject, Discovery, PythonProject, StewError};
use crate::systools::find_repo_root;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Shown before every command except `locate`, whose output is consumed by scripts
pub const INTRO: &str = "!!sparkles!! !!snake!! !!sparkles!!";

/// What every `stew` command receives
#[derive(Debug)]
pub struct StewContext {
    /// Where to look for projects; the repository root by default
    pub path: Option<PathBuf>,
    /// Options from the environment and the global flags
    pub config: StewConfig,
}

impl StewContext {
    /// A context searching from `path`
    #[must_use]
    pub fn new(path: Option<PathBuf>, config: StewConfig) -> Self {
        Self { path, config }
    }

    /// The `stew.verbose` option
    ///
    /// # Errors
    ///
    /// Fails when the option cannot be read.
    pub fn verbose(&self) -> Result<bool> {
        Ok(self.config.verbose()?)
    }

    /// Projects matching `query`
    ///
    /// # Errors
    ///
    /// Finding nothing is reported as a controlled failure.
    pub fn discover(&self, query: Option<String>, exact_match: bool) -> Result<Vec<PythonProject>> {
        let discovery = Discovery::new(self.path.clone())
            .with_query(query, exact_match)
            .verbose(self.verbose()?);
        discover_pyprojects(&discovery).map_err(not_found_as_failure)
    }

    /// The project named `name`
    ///
    /// # Errors
    ///
    /// Finding nothing is reported as a controlled failure.
    pub fn find(&self, name: &str) -> Result<PythonProject> {
        find_pyproject(name, self.path.clone(), self.verbose()?).map_err(not_found_as_failure)
    }
}

/// Missing projects are the user's business: no backtrace
pub(crate) fn not_found_as_failure(error: StewError) -> anyhow::Error {
    match error {
        StewError::PythonProjectNotFound(_) => ExitWithFailure::new(error).into(),
        other => other.into(),
    }
}

/// Print the files that were modified, relative to the repository when possible
pub(crate) fn echo_updated(updated: &[PathBuf]) {
    if updated.is_empty() {
        return;
    }
    OUTCOME.with_pad_before(true).echo("Updated:");
    let root = find_repo_root(Path::new("."), Some(Path::new("."))).ok();
    let mut sorted = updated.to_vec();
    sorted.sort();
    sorted.dedup();
    for path in sorted {
        let shown = root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(&path);
        NOISE.item().echo(shown.display());
    }
}

/// "No" when nothing changed, the count otherwise
pub(crate) fn count_or_no(count: usize) -> String {
    if count == 0 {
        "No".to_string()
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_or_no() {
        assert_eq!(count_or_no(0), "No");
        assert_eq!(count_or_no(3), "3");
    }

    #[test]
    fn test_not_found_is_controlled() {
        let error = not_found_as_failure(StewError::PythonProjectNotFound("nope".to_string()));
        assert!(error.downcast_ref::<ExitWithFailure>().is_some());

        let error = not_found_as_failure(StewError::PoetryNotFound);
        assert!(error.downcast_ref::<ExitWithFailure>().is_none());
    }
}
