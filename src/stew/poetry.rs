// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! The `[tool.poetry]` and `[tool.stew]` sections, and the lock file

use crate::flex::{self, FlexError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

// =========================================================================
// Dependencies
// =========================================================================

/// A poetry dependency such as `mypy = "*"` or `lib = { path = "../lib" }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Package name
    pub name: String,
    /// Version constraint
    pub version: String,
    /// Local path, relative to the project
    pub path: Option<PathBuf>,
    /// Only installed with an extra
    pub optional: bool,
    /// Extras to install
    pub extras: Vec<String>,
    /// Named package source
    pub source: Option<String>,
    /// Prereleases are acceptable
    pub allow_prereleases: Option<bool>,
    /// Installed in development mode
    pub develop: bool,
}

#[derive(Debug, Deserialize)]
struct DependencyTable {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    extras: Vec<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    allow_prereleases: Option<bool>,
    #[serde(default)]
    develop: bool,
}

impl Dependency {
    /// A dependency on any version of `name`
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path: None,
            optional: false,
            extras: Vec::new(),
            source: None,
            allow_prereleases: None,
            develop: false,
        }
    }

    /// Build a dependency from its `pyproject.toml` value
    ///
    /// Accepts a version string, a table, or a list of tables (multiple
    /// constraints), in which case the local one wins, then the first one.
    ///
    /// # Errors
    ///
    /// Fails on any other shape.
    pub fn from_value(name: &str, value: Value) -> Result<Self, FlexError> {
        match value {
            Value::String(version) => Ok(Self::new(name, version)),
            Value::Object(_) => {
                let table: DependencyTable = flex::deserialize(value)?;
                Ok(Self {
                    name: name.to_string(),
                    version: table.version.unwrap_or_else(|| "*".to_string()),
                    path: table.path,
                    optional: table.optional,
                    extras: table.extras,
                    source: table.source,
                    allow_prereleases: table.allow_prereleases,
                    develop: table.develop,
                })
            }
            Value::Array(constraints) => {
                let constraints = constraints
                    .into_iter()
                    .map(|constraint| Self::from_value(name, constraint))
                    .collect::<Result<Vec<_>, _>>()?;
                let preferred = constraints
                    .iter()
                    .position(Self::is_local)
                    .unwrap_or_default();
                constraints
                    .into_iter()
                    .nth(preferred)
                    .ok_or_else(|| FlexError::Message(format!("{name}: empty list of constraints")))
            }
            other => Err(FlexError::Message(format!(
                "{name}: unsupported dependency specification {other}"
            ))),
        }
    }

    /// Whether the dependency lives on disk
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.path.is_some()
    }

    /// The name and constraint pip understands, such as `setuptools>=42`
    #[must_use]
    pub fn requirement(&self) -> String {
        if self.version == "*" {
            self.name.clone()
        } else {
            format!("{}{}", self.name, self.version)
        }
    }
}

fn dependencies_from(section: BTreeMap<String, Value>) -> Result<BTreeMap<String, Dependency>, FlexError> {
    section
        .into_iter()
        .map(|(name, value)| Dependency::from_value(&name, value).map(|dependency| (name, dependency)))
        .collect()
}

// =========================================================================
// [tool.poetry]
// =========================================================================

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawPoetry {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    group: BTreeMap<String, RawGroup>,
}

/// A poetry dependency group, such as `[tool.poetry.group.docs]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    /// Not installed unless requested
    pub optional: bool,
    /// The group's dependencies
    pub dependencies: BTreeMap<String, Dependency>,
}

/// The `[tool.poetry]` section of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoetryPackage {
    /// Distribution name
    pub name: String,
    /// Current version
    pub version: String,
    /// One-line description
    pub description: String,
    /// Authors
    pub authors: Vec<String>,
    /// Runtime dependencies (`python` included)
    pub dependencies: BTreeMap<String, Dependency>,
    /// Legacy `dev-dependencies` section
    pub dev_dependencies: BTreeMap<String, Dependency>,
    /// Dependency groups
    pub groups: BTreeMap<String, DependencyGroup>,
}

impl PoetryPackage {
    /// Read the section from its JSON form; key spelling is flexible
    ///
    /// # Errors
    ///
    /// Fails when mandatory keys are missing or have the wrong type.
    pub fn from_value(value: Value) -> Result<Self, FlexError> {
        let raw: RawPoetry = flex::deserialize(value)?;
        let groups = raw
            .group
            .into_iter()
            .map(|(name, group)| {
                Ok((
                    name,
                    DependencyGroup {
                        optional: group.optional,
                        dependencies: dependencies_from(group.dependencies)?,
                    },
                ))
            })
            .collect::<Result<_, FlexError>>()?;

        Ok(Self {
            name: raw.name,
            version: raw.version,
            description: raw.description,
            authors: raw.authors,
            dependencies: dependencies_from(raw.dependencies)?,
            dev_dependencies: dependencies_from(raw.dev_dependencies)?,
            groups,
        })
    }

    /// The name as it appears in wheels and egg-info folders
    #[must_use]
    pub fn safe_name(&self) -> String {
        self.name.replace('-', "_")
    }

    /// Development dependencies: the legacy section plus the `dev` group
    ///
    /// The legacy section wins when both name the same package.
    #[must_use]
    pub fn development_dependencies(&self) -> BTreeMap<String, Dependency> {
        let mut all = self
            .groups
            .get("dev")
            .map(|group| group.dependencies.clone())
            .unwrap_or_default();
        all.extend(self.dev_dependencies.clone());
        all
    }

    /// Every dependency; development ones take precedence over duplicates
    #[must_use]
    pub fn all_dependencies(&self) -> BTreeMap<String, Dependency> {
        let mut all = self.dependencies.clone();
        for group in self.groups.values() {
            all.extend(group.dependencies.clone());
        }
        all.extend(self.dev_dependencies.clone());
        all
    }
}

// =========================================================================
// [tool.stew]
// =========================================================================

#[derive(Debug, Default, Deserialize)]
struct RawStew {
    #[serde(default)]
    pydev: bool,
    #[serde(default)]
    build_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    ci: Option<Value>,
}

/// The `[tool.stew]` section of a project
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StewOptions {
    /// The project aggregates the repository's projects for development
    pub pydev: bool,
    /// Packages needed to build the project, stored in offline wheelhouses
    pub build_dependencies: BTreeMap<String, Dependency>,
    /// The raw `[tool.stew.ci]` section
    pub ci: Map<String, Value>,
}

impl StewOptions {
    /// Read the section from its JSON form
    ///
    /// # Errors
    ///
    /// Fails when a key has the wrong type.
    pub fn from_value(value: Value) -> Result<Self, FlexError> {
        let raw: RawStew = flex::deserialize(value)?;
        let ci = match raw.ci {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(ci)) => ci,
            Some(other) => {
                return Err(FlexError::Message(format!(
                    "tool.stew.ci must be a table, not {other}"
                )))
            }
        };
        Ok(Self {
            pydev: raw.pydev,
            build_dependencies: dependencies_from(raw.build_dependencies)?,
            ci,
        })
    }
}

// =========================================================================
// poetry.lock
// =========================================================================

/// Where a locked package comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockedSource {
    /// `directory`, `legacy`, `git`...
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Index url or local path
    #[serde(default)]
    pub url: Option<String>,
}

/// A `[[package]]` entry of `poetry.lock`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockedPackage {
    /// Package name
    pub name: String,
    /// Locked version
    pub version: String,
    /// Non-default source
    #[serde(default)]
    pub source: Option<LockedSource>,
}

impl LockedPackage {
    /// The index url for packages from a custom index
    #[must_use]
    pub fn index_url(&self) -> Option<&str> {
        self.source
            .as_ref()
            .filter(|source| source.kind != "directory" && source.kind != "file")
            .and_then(|source| source.url.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LockFile {
    #[serde(default)]
    pub package: Vec<LockedPackage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dependency_shapes() {
        let plain = Dependency::from_value("requests", json!("*")).unwrap();
        assert_eq!(plain.version, "*");
        assert!(!plain.is_local());
        assert!(plain.extras.is_empty());
        assert_eq!(plain.requirement(), "requests");

        let local = Dependency::from_value("lib", json!({"path": "../lib", "Develop": true})).unwrap();
        assert_eq!(local.path, Some(PathBuf::from("../lib")));
        assert!(local.develop);
        assert_eq!(local.version, "*");

        let multiple = Dependency::from_value(
            "foo",
            json!([{"version": "^1.0", "python": "<3.8"}, {"path": "../foo"}]),
        )
        .unwrap();
        assert!(multiple.is_local());

        let constrained = Dependency::from_value("setuptools", json!({"version": ">=42", "allow-prereleases": true})).unwrap();
        assert_eq!(constrained.requirement(), "setuptools>=42");
        assert_eq!(constrained.allow_prereleases, Some(true));

        assert!(Dependency::from_value("bad", json!(3)).is_err());
    }

    #[test]
    fn test_poetry_package() {
        let package = PoetryPackage::from_value(json!({
            "name": "my-package",
            "version": "1.2.3",
            "authors": ["someone"],
            "dependencies": {"python": "^3.8", "lib": {"path": "../lib"}},
            "dev-dependencies": {"pytest": "*", "black": "22.1"},
            "group": {"dev": {"dependencies": {"black": "23.1", "mypy": "*"}}},
            "readme": "README.md"
        }))
        .unwrap();

        assert_eq!(package.safe_name(), "my_package");
        assert_eq!(package.description, "");
        assert_eq!(package.dependencies.len(), 2);

        let dev = package.development_dependencies();
        assert_eq!(dev.len(), 3);
        assert_eq!(dev["black"].version, "22.1");
        assert_eq!(package.all_dependencies().len(), 5);
    }

    #[test]
    fn test_missing_name() {
        assert!(PoetryPackage::from_value(json!({"version": "1.0"})).is_err());
    }

    #[test]
    fn test_stew_options() {
        let options = StewOptions::from_value(json!({
            "pydev": true,
            "build-dependencies": {"setuptools": ">=42"},
            "ci": {"mypy": false, "pytest": true}
        }))
        .unwrap();
        assert!(options.pydev);
        assert_eq!(options.build_dependencies["setuptools"].requirement(), "setuptools>=42");
        assert_eq!(options.ci.len(), 2);

        let empty = StewOptions::from_value(json!({})).unwrap();
        assert!(!empty.pydev);
        assert!(empty.ci.is_empty());
    }

    #[test]
    fn test_lock_file() {
        let lock: LockFile = toml::from_str(
            r#"
            [[package]]
            name = "requests"
            version = "2.20.0"

            [[package]]
            name = "private"
            version = "1.0.0"
            [package.source]
            type = "legacy"
            url = "https://pypi.example.com/simple"
            reference = "example"

            [metadata]
            lock-version = "2.0"
            "#,
        )
        .unwrap();
        assert_eq!(lock.package.len(), 2);
        assert_eq!(lock.package[0].version, "2.20.0");
        assert_eq!(lock.package[0].index_url(), None);
        assert_eq!(lock.package[1].index_url(), Some("https://pypi.example.com/simple"));
    }
}
