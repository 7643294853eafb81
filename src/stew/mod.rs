// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Poetry project orchestration
//!
//! Discovers the `pyproject.toml` files of a repository and operates on
//! them: lock, bump, build, refresh, offline wheelhouses, dev requirement
//! aggregation for "pydev" projects and continuous integration runners.

pub mod ci;
mod discovery;
mod environment;
mod offline;
mod poetry;
mod project;
mod pydev;

pub use discovery::{
    discover_pyprojects, find_pyproject, find_pyproject_paths, order_by_local_dependencies,
    Discovery,
};
pub use environment::{PythonEnvironment, PythonTool};
pub use offline::offline_publish;
pub use poetry::{Dependency, DependencyGroup, LockedPackage, PoetryPackage, StewOptions};
pub use project::{InstallOptions, PythonProject};
pub use pydev::{
    dev_dependencies_of_dependencies, is_pydev_project, pull_and_write_dev_requirements,
    render_dev_requirements, DevRequirement,
};

use crate::flex::FlexError;
use crate::systools::{FilesystemError, ProcessError};
use std::path::PathBuf;
use thiserror::Error;

/// Project definition file
pub const PYPROJECT_TOML: &str = "pyproject.toml";
/// Poetry lock file
pub const POETRY_LOCK: &str = "poetry.lock";
/// Marks a package as typed (PEP 561)
pub const TYPED_PACKAGE: &str = "py.typed";

/// Errors raised while operating on python projects
#[derive(Debug, Error)]
pub enum StewError {
    /// The `pyproject.toml` file cannot be read or understood
    #[error("Cannot load {}: {reason}", path.display())]
    CannotLoadProject {
        /// The offending file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// No project matches the query
    #[error("{0}")]
    PythonProjectNotFound(String),

    /// The operation needs a pydev project
    #[error("{}: Not a PyDev project.", .0.display())]
    NotPyDevProject(PathBuf),

    /// Poetry is not installed
    #[error("Poetry was not found; install it or add it to the PATH.")]
    PoetryNotFound,

    /// A project operation failed
    #[error("{0}")]
    Project(String),

    /// Invalid usage of the ci configuration
    #[error("{0}")]
    Usage(String),

    /// An external program failed
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A filesystem helper failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// A configuration section has an unexpected shape
    #[error(transparent)]
    Flex(#[from] FlexError),

    /// Underlying I/O failure
    #[error("{action} {}: {source}", path.display())]
    Io {
        /// What was being done
        action: &'static str,
        /// The path involved
        path: PathBuf,
        /// The I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StewError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Write a minimal poetry project and return its folder
    pub fn make_test_project(root: &Path, folder: &str, name: &str, extra: &str) -> PathBuf {
        let path = root.join(folder);
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(super::PYPROJECT_TOML),
            format!(
                "[tool.poetry]\nname = \"{name}\"\nversion = \"0.1.0\"\ndescription = \"\"\nauthors = []\n\n\
                 [tool.poetry.dependencies]\npython = \"^3.8\"\n{extra}"
            ),
        )
        .unwrap();
        path
    }

    /// A repository with a library, an app using it and a pydev project
    pub fn make_test_repo() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        make_test_project(
            temp.path(),
            "libs/core-lib",
            "core-lib",
            "\n[tool.poetry.dev-dependencies]\npytest = \"^7.0\"\nblack = \"*\"\n",
        );
        make_test_project(
            temp.path(),
            "apps/web-app",
            "web-app",
            "core-lib = { path = \"../../libs/core-lib\" }\n\n\
             [tool.poetry.dev-dependencies]\nmypy = \"^1.0\"\n",
        );
        make_test_project(
            temp.path(),
            "pydev",
            "pydev",
            "core-lib = { path = \"../libs/core-lib\" }\nweb-app = { path = \"../apps/web-app\" }\n\n\
             [tool.stew]\npydev = true\n",
        );
        temp
    }
}
