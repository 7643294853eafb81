// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! A poetry project and the operations stew performs on it

use super::ci::CiConfig;
use super::environment::{PythonEnvironment, PythonTool};
use super::poetry::{LockFile, LockedPackage, PoetryPackage, StewOptions};
use super::{StewError, POETRY_LOCK, PYPROJECT_TOML, TYPED_PACKAGE};
use crate::styles::echo;
use crate::systools::{check_run, find_repo_root, ProcessError, RunOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// like `coredump_detector-0.0.1-py3-none-any.whl`
static WHEEL_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?P<distribution>\S+?)-(?P<version>[^-\s]+?)-(?P<extra>\S+)\.whl").ok()
});

/// How `poetry install` is called
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Remove packages that are not in the lock file
    pub sync: bool,
    /// Hide poetry's output
    pub quiet: bool,
}

impl InstallOptions {
    /// Install and synchronize the environment with the lock file
    #[must_use]
    pub fn synced() -> Self {
        Self {
            sync: true,
            quiet: false,
        }
    }
}

/// A folder holding a `pyproject.toml` with a `[tool.poetry]` section
#[derive(Debug, Clone)]
pub struct PythonProject {
    project_path: PathBuf,
    toml_path: PathBuf,
    lock_path: PathBuf,
    egg_path: PathBuf,
    package: PoetryPackage,
    options: StewOptions,
    ci: CiConfig,
    repo_root: Option<PathBuf>,
    verbose: bool,
}

fn lookup<'a>(document: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(document, |value, key| value.get(key))
}

impl PythonProject {
    /// Load the project from its folder or its `pyproject.toml`
    ///
    /// # Errors
    ///
    /// `CannotLoadProject` when the file is unreadable, is not valid toml,
    /// or lacks a usable `[tool.poetry]` section.
    pub fn load(path: &Path, verbose: bool) -> Result<Self, StewError> {
        let folder = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or_else(|| Path::new("."))
        };
        let project_path = if folder.is_absolute() {
            folder.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(StewError::io("Cannot resolve", folder))?
                .join(folder)
        };
        let toml_path = project_path.join(PYPROJECT_TOML);
        let cannot_load = |reason: String| StewError::CannotLoadProject {
            path: toml_path.clone(),
            reason,
        };

        let content = fs::read_to_string(&toml_path).map_err(|error| cannot_load(error.to_string()))?;
        let document: toml::Table = toml::from_str(&content).map_err(|error| cannot_load(error.to_string()))?;
        let document = serde_json::to_value(document).map_err(|error| cannot_load(error.to_string()))?;

        let poetry = lookup(&document, &["tool", "poetry"])
            .cloned()
            .ok_or_else(|| cannot_load("missing [tool.poetry] section".to_string()))?;
        let package = PoetryPackage::from_value(poetry).map_err(|error| cannot_load(error.to_string()))?;

        let stew = lookup(&document, &["tool", "stew"])
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let options = StewOptions::from_value(stew).map_err(|error| cannot_load(error.to_string()))?;

        // pydev projects only receive the lock checks
        let ci = if options.pydev {
            CiConfig::for_pydev()
        } else {
            CiConfig::from_table(&options.ci).map_err(|error| cannot_load(error.to_string()))?
        };

        let repo_root = find_repo_root(&project_path, None).ok();
        let egg_path = project_path.join(format!("{}.egg-info", package.safe_name()));

        Ok(Self {
            lock_path: project_path.join(POETRY_LOCK),
            toml_path,
            project_path,
            egg_path,
            package,
            options,
            ci,
            repo_root,
            verbose,
        })
    }

    /// The project folder
    #[must_use]
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// The `pyproject.toml` file
    #[must_use]
    pub fn toml_path(&self) -> &Path {
        &self.toml_path
    }

    /// The `poetry.lock` file, which may not exist
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// The `<package>.egg-info` folder of editable installs
    #[must_use]
    pub fn egg_path(&self) -> &Path {
        &self.egg_path
    }

    /// The `[tool.poetry]` section
    #[must_use]
    pub fn package(&self) -> &PoetryPackage {
        &self.package
    }

    /// The `[tool.stew]` section
    #[must_use]
    pub fn options(&self) -> &StewOptions {
        &self.options
    }

    /// The continuous integration setup
    #[must_use]
    pub fn ci(&self) -> &CiConfig {
        &self.ci
    }

    /// The git repository holding the project, if any
    #[must_use]
    pub fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    /// Whether commands echo what they run
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// `path` relative to the project folder, or `path` itself
    #[must_use]
    pub fn relative_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_path).unwrap_or(path)
    }

    /// Direct subfolders holding a `py.typed` marker
    #[must_use]
    pub fn typed_folders(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.project_path) else {
            return Vec::new();
        };
        let mut folders: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join(TYPED_PACKAGE).is_file())
            .collect();
        folders.sort();
        folders
    }

    // =====================================================================
    // Lock file
    // =====================================================================

    /// The packages pinned in `poetry.lock`; none when there is no lock
    ///
    /// # Errors
    ///
    /// Fails when the lock file cannot be read or parsed.
    pub fn locked_packages(&self) -> Result<Vec<LockedPackage>, StewError> {
        if !self.lock_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.lock_path).map_err(StewError::io("Cannot read", &self.lock_path))?;
        let lock: LockFile = toml::from_str(&content).map_err(|error| StewError::CannotLoadProject {
            path: self.lock_path.clone(),
            reason: error.to_string(),
        })?;
        Ok(lock.package)
    }

    /// True when `pyproject.toml` has changes that `poetry.lock` misses
    ///
    /// A missing lock is not outdated; see [`PythonProject::lock_if_needed`].
    ///
    /// # Errors
    ///
    /// Fails when poetry cannot be started.
    pub fn lock_is_outdated(&self) -> Result<bool, StewError> {
        if !self.lock_path.exists() {
            return Ok(false);
        }
        match self.poetry_run(["check", "--lock"], true) {
            Ok(_) => Ok(false),
            Err(StewError::Process(ProcessError::Failed(failure))) => {
                debug!("{} lock check failed: {failure}", self.package.name);
                Ok(true)
            }
            Err(error) => Err(error),
        }
    }

    /// Lock when the lock is missing or outdated; returns whether it ran
    ///
    /// # Errors
    ///
    /// Fails when poetry fails.
    pub fn lock_if_needed(&self) -> Result<bool, StewError> {
        if self.lock_path.exists() && !self.lock_is_outdated()? {
            return Ok(false);
        }
        info!("locking {}", self.package.name);
        self.poetry_run(["lock"], false)?;
        Ok(true)
    }

    /// Update every dependency in the lock; returns whether it changed
    ///
    /// # Errors
    ///
    /// Fails when poetry fails or the lock is unreadable.
    pub fn bump(&self) -> Result<bool, StewError> {
        if !self.lock_path.exists() {
            return self.lock_if_needed();
        }
        let read = || fs::read_to_string(&self.lock_path).map_err(StewError::io("Cannot read", &self.lock_path));
        let before = read()?;
        self.poetry_run(["update", "--lock"], false)?;
        Ok(before != read()?)
    }

    // =====================================================================
    // Environments
    // =====================================================================

    /// The project's virtual environments, as listed by poetry
    ///
    /// With `create_default_if_missing`, poetry creates its default
    /// environment when there is none.
    ///
    /// # Errors
    ///
    /// Fails when poetry fails.
    pub fn virtual_environments(&self, create_default_if_missing: bool) -> Result<Vec<PythonEnvironment>, StewError> {
        let listing = self
            .poetry_run(["env", "list", "--full-path"], true)?
            .unwrap_or_default();
        let environments: Vec<PythonEnvironment> = listing
            .lines()
            .map(|line| line.replace("(Activated)", "").trim().to_string())
            .filter(|line| !line.is_empty())
            .map(PythonEnvironment::new)
            .collect();

        if environments.is_empty() && create_default_if_missing {
            // poetry creates the environment on demand
            self.poetry_run(["run", "python", "--version"], true)?;
            return self.virtual_environments(false);
        }
        Ok(environments)
    }

    /// True when stew runs from one of the project's environments
    ///
    /// # Errors
    ///
    /// Fails when poetry fails.
    pub fn current_environment_belongs_to_project(&self) -> Result<bool, StewError> {
        let Some(active) = std::env::var_os("VIRTUAL_ENV") else {
            return Ok(false);
        };
        let active = PathBuf::from(active);
        Ok(self
            .virtual_environments(false)?
            .iter()
            .any(|environment| environment.root() == Some(active.as_path())))
    }

    /// `poetry install`
    ///
    /// # Errors
    ///
    /// Fails when poetry fails.
    pub fn install(&self, options: InstallOptions) -> Result<(), StewError> {
        let mut command = vec!["install"];
        if options.sync {
            command.push("--sync");
        }
        if options.quiet {
            command.push("--quiet");
        }
        self.poetry_run(command, false)?;
        Ok(())
    }

    /// Remove the egg-info folder; returns whether there was one
    ///
    /// # Errors
    ///
    /// Fails when the folder cannot be removed.
    pub fn remove_egg_info(&self) -> Result<bool, StewError> {
        if !self.egg_path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.egg_path).map_err(StewError::io("Cannot remove", &self.egg_path))?;
        Ok(true)
    }

    /// Recreate the environment from scratch
    ///
    /// # Errors
    ///
    /// Fails when poetry fails.
    pub fn refresh(&self) -> Result<(), StewError> {
        self.remove_egg_info()?;
        self.poetry_run(["env", "remove", "python"], false)?;
        self.lock_if_needed()?;
        self.install(InstallOptions::synced())
    }

    // =====================================================================
    // Packaging
    // =====================================================================

    /// Build the wheel, moving it into `target` when given
    ///
    /// Returns the final path of the wheel.
    ///
    /// # Errors
    ///
    /// Fails when poetry fails or its output names an unexpected wheel.
    pub fn build(&self, target: Option<&Path>) -> Result<PathBuf, StewError> {
        let output = self
            .poetry_run(["build", "--format", "wheel"], true)?
            .unwrap_or_default();
        let wheel_name = self.wheel_from_output(&output)?;
        let wheel = self.project_path.join("dist").join(&wheel_name);
        if !wheel.exists() {
            return Err(StewError::Project(format!("{} cannot be found.", wheel.display())));
        }

        let Some(target) = target else {
            return Ok(wheel);
        };
        fs::create_dir_all(target).map_err(StewError::io("Cannot create", target))?;
        let moved = target.join(&wheel_name);
        if fs::rename(&wheel, &moved).is_err() {
            // across devices
            fs::copy(&wheel, &moved).map_err(StewError::io("Cannot copy", &wheel))?;
            fs::remove_file(&wheel).map_err(StewError::io("Cannot remove", &wheel))?;
        }
        Ok(moved)
    }

    fn wheel_from_output(&self, output: &str) -> Result<String, StewError> {
        let not_found = || {
            StewError::Project(format!(
                "Unable to find a wheel filename in poetry's output:\n{output}"
            ))
        };
        let pattern = WHEEL_PATTERN.as_ref().ok_or_else(not_found)?;
        let found = pattern.captures(output).ok_or_else(not_found)?;

        let distribution = &found["distribution"];
        let version = &found["version"];
        if distribution != self.package.safe_name() || version != self.package.version {
            return Err(StewError::Project(format!(
                "Expected a wheel for {} {}, poetry built {distribution} {version}.",
                self.package.safe_name(),
                self.package.version
            )));
        }
        Ok(found[0].to_string())
    }

    // =====================================================================
    // Poetry
    // =====================================================================

    /// Run poetry from stew's environment, outside of any active virtualenv
    ///
    /// Returns the output when `capture` is set.
    ///
    /// # Errors
    ///
    /// `PoetryNotFound` when poetry is not installed, or the process error.
    pub fn poetry_run<I, S>(&self, args: I, capture: bool) -> Result<Option<String>, StewError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let host = PythonEnvironment::host();
        if !host.has_tool(PythonTool::Poetry) {
            return Err(StewError::PoetryNotFound);
        }

        let mut command = host.build_command(PythonTool::Poetry, args);
        if self.verbose {
            command.push("-vv".to_string());
        }
        let options = RunOptions::new()
            .in_directory(&self.project_path)
            .capture_output(capture)
            .verbose(self.verbose)
            .without_env("VIRTUAL_ENV");
        Ok(check_run(&command, &options)?)
    }

    /// Echo the project, for verbose listings
    pub(crate) fn echo_found(&self) {
        if self.verbose {
            echo::noise(format!("PyProject found: {self}"));
        }
    }
}

impl fmt::Display for PythonProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.package.name, self.toml_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stew::test_support::{make_test_project, make_test_repo};
    use tempfile::TempDir;

    #[test]
    fn test_load_from_folder_or_file() {
        let repo = make_test_repo();
        let folder = repo.path().join("libs/core-lib");
        let from_folder = PythonProject::load(&folder, false).unwrap();
        let from_file = PythonProject::load(&folder.join(PYPROJECT_TOML), false).unwrap();

        assert_eq!(from_folder.package().name, "core-lib");
        assert_eq!(from_folder.project_path(), from_file.project_path());
        assert_eq!(from_folder.package().dev_dependencies.len(), 2);
        assert!(from_folder.lock_path().ends_with(POETRY_LOCK));
        assert!(from_folder.repo_root().is_some());
        assert!(from_folder.to_string().starts_with("core-lib ["));
    }

    #[test]
    fn test_pydev_ci_is_restricted() {
        let repo = make_test_repo();
        let pydev = PythonProject::load(&repo.path().join("pydev"), false).unwrap();
        assert!(pydev.options().pydev);
        let names: Vec<&str> = pydev.ci().runner_names().collect();
        assert_eq!(names, ["check-outdated", "poetry-check"]);
    }

    #[test]
    fn test_load_errors() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            PythonProject::load(temp.path(), false),
            Err(StewError::CannotLoadProject { .. })
        ));

        fs::write(temp.path().join(PYPROJECT_TOML), "[tool.black]\nline-length = 100\n").unwrap();
        let error = PythonProject::load(temp.path(), false).unwrap_err();
        assert!(error.to_string().contains("[tool.poetry]"));
    }

    #[test]
    fn test_locked_packages_and_missing_lock() {
        let temp = TempDir::new().unwrap();
        let folder = make_test_project(temp.path(), "lib", "lib", "");
        let project = PythonProject::load(&folder, false).unwrap();
        assert!(project.locked_packages().unwrap().is_empty());
        assert!(!project.lock_is_outdated().unwrap());

        fs::write(
            folder.join(POETRY_LOCK),
            "[[package]]\nname = \"attrs\"\nversion = \"23.1.0\"\n",
        )
        .unwrap();
        let locked = project.locked_packages().unwrap();
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].name, "attrs");
    }

    #[test]
    fn test_egg_info_removal() {
        let temp = TempDir::new().unwrap();
        let folder = make_test_project(temp.path(), "my-lib", "my-lib", "");
        fs::create_dir(folder.join("my_lib.egg-info")).unwrap();
        let project = PythonProject::load(&folder, false).unwrap();

        assert!(project.remove_egg_info().unwrap());
        assert!(!folder.join("my_lib.egg-info").exists());
        assert!(!project.remove_egg_info().unwrap());
    }

    #[test]
    fn test_typed_folders() {
        let temp = TempDir::new().unwrap();
        let folder = make_test_project(temp.path(), "lib", "lib", "");
        fs::create_dir_all(folder.join("lib")).unwrap();
        fs::write(folder.join("lib").join(TYPED_PACKAGE), "").unwrap();
        let nested = folder.join("tests/fixtures");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(TYPED_PACKAGE), "").unwrap();

        let project = PythonProject::load(&folder, false).unwrap();
        assert_eq!(project.typed_folders(), vec![project.project_path().join("lib")]);
    }

    #[test]
    fn test_wheel_name_from_output() {
        let temp = TempDir::new().unwrap();
        let folder = make_test_project(temp.path(), "my-lib", "my-lib", "");
        let project = PythonProject::load(&folder, false).unwrap();

        let output = "Building my-lib (0.1.0)\n  - Built my_lib-0.1.0-py3-none-any.whl\n";
        assert_eq!(project.wheel_from_output(output).unwrap(), "my_lib-0.1.0-py3-none-any.whl");
        assert!(project.wheel_from_output("Building nothing").is_err());
        assert!(project
            .wheel_from_output("Built other-0.1.0-py3-none-any.whl")
            .is_err());
    }
}
