// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! pydev projects
//!
//! A pydev project links the python projects of a repository so developers
//! get a single environment. Its dev-dependencies are the dev-dependencies
//! of its local dependencies, pulled and written by stew.

use super::project::{InstallOptions, PythonProject};
use super::StewError;
use crate::systools::safe_text_write;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use toml_edit::{DocumentMut, InlineTable, Item, Table};
use tracing::debug;

const AUTOGENERATED: &str = " # pydev projects' dev-dependencies are autogenerated; do not edit manually!";

/// A dev-dependency pulled into a pydev project
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DevRequirement {
    /// Package name
    pub name: String,
    /// Version constraint, for packages from an index
    pub version: String,
    /// Path relative to the pydev project, for local packages
    pub path: Option<PathBuf>,
}

impl DevRequirement {
    fn to_item(&self) -> Item {
        match &self.path {
            Some(path) => {
                let mut table = InlineTable::new();
                table.insert("path", path.to_string_lossy().replace('\\', "/").into());
                Item::Value(table.into())
            }
            None => toml_edit::value(self.version.as_str()),
        }
    }
}

/// Whether the project is marked with `[tool.stew] pydev = true`
#[must_use]
pub fn is_pydev_project(project: &PythonProject) -> bool {
    project.options().pydev
}

/// Join two relative paths, resolving `..` without touching the disk
fn join_lexically(base: &Path, relative: &Path) -> PathBuf {
    let mut joined: Vec<Component<'_>> = Vec::new();
    for component in base.components().chain(relative.components()) {
        match component {
            Component::CurDir => {}
            Component::ParentDir if matches!(joined.last(), Some(Component::Normal(_))) => {
                joined.pop();
            }
            other => joined.push(other),
        }
    }
    joined.iter().collect()
}

/// The dev-dependencies of the project's local dependencies, sorted by name
///
/// Names already seen, starting with the project's own dependencies, are
/// skipped. Local dev-dependencies are made relative to the project.
///
/// # Errors
///
/// Fails when a local dependency cannot be loaded.
pub fn dev_dependencies_of_dependencies(project: &PythonProject) -> Result<Vec<DevRequirement>, StewError> {
    let mut seen: BTreeSet<String> = project.package().dependencies.keys().cloned().collect();
    let mut pulled = Vec::new();

    for dependency in project.package().dependencies.values() {
        let Some(path) = &dependency.path else {
            continue;
        };
        if path.is_absolute() {
            return Err(StewError::Project(format!(
                "{}: local dependency {} must use a relative path.",
                project.package().name,
                dependency.name
            )));
        }
        let local = PythonProject::load(&project.project_path().join(path), project.verbose())?;
        for (name, dev_dependency) in local.package().development_dependencies() {
            if !seen.insert(name.clone()) {
                continue;
            }
            debug!("pulling {name} from {}", local.package().name);
            pulled.push(DevRequirement {
                name,
                version: dev_dependency.version.clone(),
                path: dev_dependency
                    .path
                    .as_deref()
                    .map(|dev_path| join_lexically(path, dev_path)),
            });
        }
    }

    pulled.sort();
    Ok(pulled)
}

/// `toml_content` with its `[tool.poetry.dev-dependencies]` replaced by `requirements`
///
/// The rest of the document, comments included, is preserved.
///
/// # Errors
///
/// Fails when the document is not valid toml or has no `[tool.poetry]` table.
pub fn render_dev_requirements(toml_content: &str, requirements: &[DevRequirement]) -> Result<String, StewError> {
    let invalid = |reason: String| StewError::Project(format!("Cannot update the dev-dependencies: {reason}"));
    let mut document: DocumentMut = toml_content.parse().map_err(|error: toml_edit::TomlError| invalid(error.to_string()))?;

    let poetry = document
        .get_mut("tool")
        .and_then(Item::as_table_mut)
        .and_then(|tool| tool.get_mut("poetry"))
        .and_then(Item::as_table_mut)
        .ok_or_else(|| invalid("missing [tool.poetry] table".to_string()))?;

    let mut section = Table::new();
    for requirement in requirements {
        section.insert(&requirement.name, requirement.to_item());
    }
    section.decor_mut().set_suffix(AUTOGENERATED);

    match poetry.get_mut("dev-dependencies").and_then(Item::as_table_mut) {
        Some(existing) => {
            existing.clear();
            for (key, item) in section.iter() {
                existing.insert(key, item.clone());
            }
            existing.decor_mut().set_suffix(AUTOGENERATED);
        }
        None => {
            poetry.insert("dev-dependencies", Item::Table(section));
        }
    }
    Ok(document.to_string())
}

/// Pull the dev-dependencies into a pydev project; returns whether it changed
///
/// Outside of a dry run, a change is locked and installed.
///
/// # Errors
///
/// `NotPyDevProject` for regular projects, or an I/O or poetry failure.
pub fn pull_and_write_dev_requirements(project: &PythonProject, dry_run: bool) -> Result<bool, StewError> {
    if !is_pydev_project(project) {
        return Err(StewError::NotPyDevProject(project.project_path().to_path_buf()));
    }

    let current = fs::read_to_string(project.toml_path()).map_err(StewError::io("Cannot read", project.toml_path()))?;
    let requirements = dev_dependencies_of_dependencies(project)?;
    let rendered = render_dev_requirements(&current, &requirements)?;

    if !safe_text_write(project.toml_path(), &rendered, true, dry_run)? {
        return Ok(false);
    }
    if !dry_run && project.lock_if_needed()? {
        project.install(InstallOptions::synced())?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stew::test_support::make_test_repo;
    use crate::stew::PYPROJECT_TOML;

    #[test]
    fn test_join_lexically() {
        assert_eq!(join_lexically(Path::new("../libs/core"), Path::new("../tools")), PathBuf::from("../libs/tools"));
        assert_eq!(join_lexically(Path::new("../a"), Path::new("./b")), PathBuf::from("../a/b"));
        assert_eq!(join_lexically(Path::new(".."), Path::new("../x")), PathBuf::from("../../x"));
    }

    #[test]
    fn test_dev_dependencies_of_dependencies() {
        let repo = make_test_repo();
        let pydev = PythonProject::load(&repo.path().join("pydev"), false).unwrap();
        let pulled = dev_dependencies_of_dependencies(&pydev).unwrap();
        let names: Vec<&str> = pulled.iter().map(|requirement| requirement.name.as_str()).collect();
        assert_eq!(names, ["black", "mypy", "pytest"]);
        assert_eq!(pulled[2].version, "^7.0");
        assert!(pulled.iter().all(|requirement| requirement.path.is_none()));
    }

    #[test]
    fn test_render_preserves_the_document() {
        let content = "# header\n[tool.poetry]\nname = \"pydev\"\nversion = \"0.1.0\"\n\n\
                       [tool.poetry.dev-dependencies]\nstale = \"*\"\n\n[tool.stew]\npydev = true\n";
        let requirements = vec![
            DevRequirement {
                name: "black".into(),
                version: "*".into(),
                path: None,
            },
            DevRequirement {
                name: "tools".into(),
                version: "*".into(),
                path: Some(PathBuf::from("../tools")),
            },
        ];
        let rendered = render_dev_requirements(content, &requirements).unwrap();

        assert!(rendered.starts_with("# header\n"));
        assert!(!rendered.contains("stale"));
        assert!(rendered.contains("black = \"*\""));
        assert!(rendered.contains("tools = { path = \"../tools\" }"));
        assert!(rendered.contains("do not edit manually!"));
        assert!(rendered.contains("[tool.stew]"));

        let reparsed: toml::Table = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed["tool"]["poetry"]["dev-dependencies"].as_table().unwrap().len(), 2);
    }

    #[test]
    fn test_render_requires_poetry_table() {
        assert!(render_dev_requirements("[tool.black]\n", &[]).is_err());
        assert!(render_dev_requirements("not = [valid", &[]).is_err());
    }

    #[test]
    fn test_pull_dry_run_does_not_write() {
        let repo = make_test_repo();
        let toml_path = repo.path().join("pydev").join(PYPROJECT_TOML);
        let before = fs::read_to_string(&toml_path).unwrap();
        let pydev = PythonProject::load(&repo.path().join("pydev"), false).unwrap();

        assert!(pull_and_write_dev_requirements(&pydev, true).unwrap());
        assert_eq!(fs::read_to_string(&toml_path).unwrap(), before);
    }

    #[test]
    fn test_regular_project_is_rejected() {
        let repo = make_test_repo();
        let library = PythonProject::load(&repo.path().join("libs/core-lib"), false).unwrap();
        assert!(!is_pydev_project(&library));
        assert!(matches!(
            pull_and_write_dev_requirements(&library, true),
            Err(StewError::NotPyDevProject(_))
        ));
    }
}
