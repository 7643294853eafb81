// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Finding the python projects of a repository

use super::project::PythonProject;
use super::{StewError, PYPROJECT_TOML};
use crate::systools::find_repo_root;
use ignore::WalkBuilder;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::{Incoming, Outgoing};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to look for, and where
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Where to start; the repository root (or `.`) by default
    pub path: Option<PathBuf>,
    /// Name, or part of a name; `-` and `_` are equivalent
    pub query: Option<String>,
    /// The query must match the whole name
    pub exact_match: bool,
    /// Echo each project found
    pub verbose: bool,
}

impl Discovery {
    /// Every project under `path`
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    /// Only the projects matching `query`
    #[must_use]
    pub fn with_query(mut self, query: Option<String>, exact_match: bool) -> Self {
        self.query = query;
        self.exact_match = exact_match;
        self
    }

    /// Echo the projects found
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn search_root(&self) -> Result<PathBuf, StewError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(find_repo_root(Path::new("."), Some(Path::new(".")))?),
        }
    }

    fn matches(&self, project: &PythonProject) -> bool {
        let Some(query) = &self.query else {
            return true;
        };
        let query = normalize_name(query);
        let name = normalize_name(&project.package().name);
        if self.exact_match {
            name == query
        } else {
            name.contains(&query)
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// Every `pyproject.toml` under `path`, skipping hidden and git-ignored folders
#[must_use]
pub fn find_pyproject_paths(path: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkBuilder::new(path)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build()
        .filter_map(|entry| {
            entry
                .map_err(|error| debug!("skipping unreadable entry: {error}"))
                .ok()
        })
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
        .filter(|entry| entry.file_name() == PYPROJECT_TOML)
        .map(ignore::DirEntry::into_path)
        .collect();
    found.sort();
    found
}

/// The projects matching `discovery`
///
/// Files without a `[tool.poetry]` section are skipped with a warning.
///
/// # Errors
///
/// `PythonProjectNotFound` when nothing matches, or when an exact match is
/// requested without a query.
pub fn discover_pyprojects(discovery: &Discovery) -> Result<Vec<PythonProject>, StewError> {
    if discovery.exact_match && discovery.query.is_none() {
        return Err(StewError::PythonProjectNotFound(
            "An exact match was requested but no query was provided.".to_string(),
        ));
    }

    let root = discovery.search_root()?;
    let mut projects = Vec::new();
    for toml_path in find_pyproject_paths(&root) {
        let project = match PythonProject::load(&toml_path, discovery.verbose) {
            Ok(project) => project,
            Err(error @ StewError::CannotLoadProject { .. }) => {
                warn!("{error}");
                continue;
            }
            Err(error) => return Err(error),
        };
        project.echo_found();
        if discovery.matches(&project) {
            projects.push(project);
        }
    }

    if projects.is_empty() {
        return Err(StewError::PythonProjectNotFound(match &discovery.query {
            Some(query) => format!("Cannot find any project that could match {query}"),
            None => "No python projects were found.".to_string(),
        }));
    }
    Ok(projects)
}

/// The project named `name`, `-` and `_` being equivalent
///
/// # Errors
///
/// `PythonProjectNotFound` when there is no such project.
pub fn find_pyproject(name: &str, path: Option<PathBuf>, verbose: bool) -> Result<PythonProject, StewError> {
    let discovery = Discovery::new(path)
        .with_query(Some(name.to_string()), true)
        .verbose(verbose);
    let root = discovery.search_root()?;
    discover_pyprojects(&discovery)
        .map_err(|_| StewError::PythonProjectNotFound(format!("{name} cannot be found in {}", root.display())))?
        .into_iter()
        .next()
        .ok_or_else(|| StewError::PythonProjectNotFound(format!("{name} cannot be found in {}", root.display())))
}

/// Sort `projects` so that local dependencies come before their dependents
///
/// Projects without links keep their relative order.
///
/// # Errors
///
/// Fails when local dependencies form a cycle.
pub fn order_by_local_dependencies(projects: Vec<PythonProject>) -> Result<Vec<PythonProject>, StewError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut node_indices: HashMap<PathBuf, NodeIndex> = HashMap::new();
    let nodes: Vec<NodeIndex> = (0..projects.len()).map(|index| graph.add_node(index)).collect();
    for (project, node) in projects.iter().zip(&nodes) {
        node_indices.insert(canonical(project.project_path()), *node);
    }

    for (project, node) in projects.iter().zip(&nodes) {
        for dependency in project.package().all_dependencies().values() {
            let Some(path) = &dependency.path else {
                continue;
            };
            if let Some(dependency_node) = node_indices.get(&canonical(&project.project_path().join(path))) {
                graph.add_edge(*dependency_node, *node, ());
            }
        }
    }

    // Kahn's algorithm, always releasing the earliest ready project
    let mut pending: Vec<usize> = nodes
        .iter()
        .map(|node| graph.neighbors_directed(*node, Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| Reverse(index))
        .collect();
    let mut order = Vec::with_capacity(projects.len());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for dependent in graph.neighbors_directed(nodes[index], Outgoing) {
            let dependent = graph[dependent];
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < projects.len() {
        let name = pending
            .iter()
            .position(|count| *count > 0)
            .and_then(|index| projects.get(index))
            .map_or_else(String::new, |project| project.package().name.clone());
        return Err(StewError::Project(format!("Circular local dependency involving {name}.")));
    }

    let mut slots: Vec<Option<PythonProject>> = projects.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots.get_mut(index).and_then(Option::take))
        .collect())
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stew::test_support::{make_test_project, make_test_repo};
    use tempfile::TempDir;

    fn names(projects: &[PythonProject]) -> Vec<&str> {
        projects.iter().map(|project| project.package().name.as_str()).collect()
    }

    #[test]
    fn test_find_pyproject_paths_skips_hidden_folders() {
        let repo = make_test_repo();
        make_test_project(repo.path(), ".venv/lib/site-packages/vendored", "vendored", "");
        assert_eq!(find_pyproject_paths(repo.path()).len(), 3);
    }

    #[test]
    fn test_discover_all_and_partial() {
        let repo = make_test_repo();
        let all = discover_pyprojects(&Discovery::new(Some(repo.path().to_path_buf()))).unwrap();
        assert_eq!(all.len(), 3);

        let partial = Discovery::new(Some(repo.path().to_path_buf())).with_query(Some("core_".into()), false);
        assert_eq!(names(&discover_pyprojects(&partial).unwrap()), ["core-lib"]);
    }

    #[test]
    fn test_exact_match() {
        let repo = make_test_repo();
        let exact = Discovery::new(Some(repo.path().to_path_buf())).with_query(Some("Web_App".into()), true);
        assert_eq!(names(&discover_pyprojects(&exact).unwrap()), ["web-app"]);

        let too_short = Discovery::new(Some(repo.path().to_path_buf())).with_query(Some("web".into()), true);
        assert!(matches!(
            discover_pyprojects(&too_short),
            Err(StewError::PythonProjectNotFound(message)) if message.contains("could match web")
        ));

        let found = find_pyproject("core_lib", Some(repo.path().to_path_buf()), false).unwrap();
        assert_eq!(found.package().name, "core-lib");
        assert!(find_pyproject("nope", Some(repo.path().to_path_buf()), false).is_err());
    }

    #[test]
    fn test_exact_match_requires_query() {
        let discovery = Discovery {
            exact_match: true,
            ..Discovery::default()
        };
        let error = discover_pyprojects(&discovery).unwrap_err();
        assert!(error.to_string().contains("no query was provided"));
    }

    #[test]
    fn test_no_projects() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PYPROJECT_TOML), "[tool.black]\n").unwrap();
        let error = discover_pyprojects(&Discovery::new(Some(temp.path().to_path_buf()))).unwrap_err();
        assert_eq!(error.to_string(), "No python projects were found.");
    }

    #[test]
    fn test_order_by_local_dependencies() {
        let repo = make_test_repo();
        let mut projects = discover_pyprojects(&Discovery::new(Some(repo.path().to_path_buf()))).unwrap();
        projects.reverse();
        let ordered = order_by_local_dependencies(projects).unwrap();
        let ordered = names(&ordered);
        let position = |name: &str| ordered.iter().position(|found| *found == name).unwrap();
        assert!(position("core-lib") < position("web-app"));
        assert!(position("web-app") < position("pydev"));
    }

    #[test]
    fn test_independent_projects_keep_their_order() {
        let temp = TempDir::new().unwrap();
        make_test_project(temp.path(), "zeta", "zeta", "");
        make_test_project(temp.path(), "alpha", "alpha", "base = { path = \"../base\" }\n");
        make_test_project(temp.path(), "mid", "mid", "");
        make_test_project(temp.path(), "base", "base", "");
        let mut projects = discover_pyprojects(&Discovery::new(Some(temp.path().to_path_buf()))).unwrap();
        let rank = |project: &PythonProject| {
            ["zeta", "alpha", "mid", "base"]
                .iter()
                .position(|name| *name == project.package().name)
        };
        projects.sort_by_key(rank);

        let ordered = order_by_local_dependencies(projects).unwrap();
        assert_eq!(names(&ordered), ["zeta", "mid", "base", "alpha"]);
    }

    #[test]
    fn test_circular_dependencies() {
        let temp = TempDir::new().unwrap();
        make_test_project(temp.path(), "a", "a", "b = { path = \"../b\" }\n");
        make_test_project(temp.path(), "b", "b", "a = { path = \"../a\" }\n");
        let projects = discover_pyprojects(&Discovery::new(Some(temp.path().to_path_buf()))).unwrap();
        assert!(order_by_local_dependencies(projects).is_err());
    }
}
