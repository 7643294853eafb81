// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Offline wheelhouses
//!
//! Stores a project and its locked dependencies as wheels in a folder, so
//! that `pip install --no-index --find-links <folder>` works without network.
//! Wheels may be specific to an interpreter, hence the explicit environment.

use super::environment::{PythonEnvironment, PythonTool};
use super::poetry::LockedPackage;
use super::project::{InstallOptions, PythonProject};
use super::StewError;
use crate::styles::echo;
use crate::systools::{check_call, check_output, RunOptions};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PIP_OPTIONS: [&str; 5] = [
    "--disable-pip-version-check",
    "--no-input",
    "--exists-action",
    "i",
    "--pre",
];

#[derive(Debug, Deserialize)]
struct PipListEntry {
    name: String,
}

fn package_key(name: &str) -> String {
    name.replace('_', "-").to_lowercase()
}

/// Build the project and its locked dependencies into `wheelhouse`
///
/// The wheelhouse is validated by resolving the project from it alone.
///
/// # Errors
///
/// Fails when the project is not locked, or when poetry or pip fail.
pub fn offline_publish(
    project: &PythonProject,
    wheelhouse: &Path,
    environment: &PythonEnvironment,
    quiet: bool,
) -> Result<(), StewError> {
    OfflinePublish::new(project, wheelhouse, environment)?.perform(quiet)
}

struct OfflinePublish<'a> {
    project: &'a PythonProject,
    wheelhouse: PathBuf,
    environment: &'a PythonEnvironment,
    local_projects: BTreeMap<String, PathBuf>,
    locked_packages: BTreeMap<String, LockedPackage>,
}

impl<'a> OfflinePublish<'a> {
    fn new(project: &'a PythonProject, wheelhouse: &Path, environment: &'a PythonEnvironment) -> Result<Self, StewError> {
        let local_projects = project
            .package()
            .all_dependencies()
            .into_values()
            .filter_map(|dependency| {
                let path = dependency.path?;
                Some((package_key(&dependency.name), project.project_path().join(path)))
            })
            .collect();
        let locked_packages = project
            .locked_packages()?
            .into_iter()
            .map(|package| (package_key(&package.name), package))
            .collect();

        Ok(Self {
            project,
            wheelhouse: wheelhouse.to_path_buf(),
            environment,
            local_projects,
            locked_packages,
        })
    }

    fn perform(&self, quiet: bool) -> Result<(), StewError> {
        if !self.project.lock_path().exists() {
            return Err(StewError::Project("Project isn't locked; can't proceed.".to_string()));
        }
        std::fs::create_dir_all(&self.wheelhouse).map_err(StewError::io("Cannot create", &self.wheelhouse))?;

        self.project.install(InstallOptions { sync: false, quiet })?;
        self.project.build(Some(&self.wheelhouse))?;
        self.store_build_dependencies(self.project)?;
        self.store_dependencies()?;

        let package = self.project.package();
        self.validate(&format!("{}=={}", package.name, package.version))
    }

    fn call(&self, command: &[String], in_wheelhouse: bool) -> Result<(), StewError> {
        let verbose = self.project.verbose();
        let mut options = RunOptions::new().verbose(verbose);
        if in_wheelhouse {
            options = options.in_directory(&self.wheelhouse);
        }
        if verbose {
            check_call(command, &options)?;
        } else {
            check_output(command, &options)?;
        }
        Ok(())
    }

    /// Packages installed in the project's environment, lowercased
    fn valid_packages(&self) -> Result<BTreeSet<String>, StewError> {
        let environments = self.project.virtual_environments(false)?;
        let inspected = if environments.contains(self.environment) {
            self.environment.clone()
        } else {
            let fallback = self
                .project
                .virtual_environments(true)?
                .into_iter()
                .next()
                .ok_or_else(|| StewError::Project(format!("{} has no virtual environment.", self.project.package().name)))?;
            echo::warning(format!(
                "The executable {} is not part of this project. To fix this, run \"poetry env use {}\".",
                self.environment,
                self.environment.python_executable().display()
            ));
            fallback
        };

        echo::noise(format!("Inspecting packages in {inspected}"));
        let mut command = inspected.build_command(PythonTool::Pip, ["list", "--format", "json"]);
        command.extend(PIP_OPTIONS.iter().map(ToString::to_string));
        let listing = check_output(&command, &RunOptions::new().verbose(self.project.verbose()))?;
        let entries: Vec<PipListEntry> = serde_json::from_str(&listing)
            .map_err(|error| StewError::Project(format!("Cannot read the output of pip list: {error}")))?;
        Ok(entries.into_iter().map(|entry| package_key(&entry.name)).collect())
    }

    /// Build dependencies such as `setuptools>=42`
    fn store_build_dependencies(&self, project: &PythonProject) -> Result<(), StewError> {
        for dependency in project.options().build_dependencies.values() {
            let command = self
                .environment
                .build_command(PythonTool::Pip, ["wheel".to_string(), dependency.requirement()]);
            self.call(&command, true)?;
        }
        Ok(())
    }

    fn store_dependencies(&self) -> Result<(), StewError> {
        let mut to_download: Vec<&LockedPackage> = Vec::new();
        let mut index_urls: BTreeSet<&str> = BTreeSet::new();

        for requirement in self.valid_packages()? {
            let Some(locked) = self.locked_packages.get(&requirement) else {
                // dev dependency, or installed by hand
                continue;
            };
            if let Some(path) = self.local_projects.get(&requirement) {
                let local = PythonProject::load(path, self.project.verbose())?;
                info!("building {} from {}", local.package().name, path.display());
                self.store_build_dependencies(&local)?;
                local.build(Some(&self.wheelhouse))?;
            } else {
                to_download.push(locked);
                index_urls.extend(locked.index_url());
            }
        }

        self.download(&to_download, index_urls.into_iter().collect())
    }

    fn download(&self, packages: &[&LockedPackage], index_urls: Vec<&str>) -> Result<(), StewError> {
        if packages.is_empty() {
            debug!("nothing to download");
            return Ok(());
        }

        let wheelhouse = self.wheelhouse.to_string_lossy().into_owned();
        let mut args: Vec<String> = vec!["wheel".to_string()];
        args.extend(packages.iter().map(|package| format!("{}=={}", package.name, package.version)));
        args.extend(["--wheel-dir", wheelhouse.as_str(), "--no-deps", "--no-cache-dir"].map(String::from));
        args.extend(PIP_OPTIONS.map(String::from));

        let mut urls = index_urls.into_iter();
        if let Some(index) = urls.next() {
            args.extend(["--index-url".to_string(), index.to_string()]);
            for extra in urls {
                args.extend(["--extra-index-url".to_string(), extra.to_string()]);
            }
        }

        let command = self.environment.build_command(PythonTool::Pip, args);
        self.call(&command, false)
    }

    /// Resolve `specification` and its dependencies from the wheelhouse only
    fn validate(&self, specification: &str) -> Result<(), StewError> {
        let wheelhouse = self.wheelhouse.to_string_lossy().into_owned();
        let mut args: Vec<String> = [
            "wheel",
            specification,
            "--find-links",
            wheelhouse.as_str(),
            "--wheel-dir",
            wheelhouse.as_str(),
            "--no-index",
        ]
        .map(String::from)
        .to_vec();
        args.extend(PIP_OPTIONS.map(String::from));

        let command = self.environment.build_command(PythonTool::Pip, args);
        self.call(&command, true)
    }
}
