// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! `stew locate`: print the folder of a project

use super::StewContext;
use crate::styles::{echo, ExitWithFailure};
use crate::stew::{discover_pyprojects, find_pyproject, Discovery, StewError};
use anyhow::Result;

/// Run the command
///
/// The name must match exactly; partial matches are suggested on failure.
///
/// # Errors
///
/// Fails when there is no exact match.
pub fn run(context: &StewContext, project_name: &str) -> Result<()> {
    let verbose = context.verbose()?;
    let error = match find_pyproject(project_name, context.path.clone(), verbose) {
        Ok(project) => {
            echo::passthrough(project.project_path().display());
            return Ok(());
        }
        Err(error @ StewError::PythonProjectNotFound(_)) => error,
        Err(error) => return Err(error.into()),
    };

    let discovery = Discovery::new(context.path.clone())
        .with_query(Some(project_name.to_string()), false)
        .verbose(verbose);
    let failure = ExitWithFailure::new(&error);
    match discover_pyprojects(&discovery) {
        Ok(partial_matches) => {
            let mut suggestions = vec!["Exact match required but partial matches were found:".to_string()];
            suggestions.extend(partial_matches.iter().map(|project| project.package().name.clone()));
            Err(failure.with_suggestions(suggestions).into())
        }
        Err(StewError::PythonProjectNotFound(_)) => Err(failure.into()),
        Err(other) => Err(other.into()),
    }
}
