// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! The `[tool.stew.ci]` section
//!
//! Each builtin runner is toggled by `true`/`false` or configured by a
//! table; `custom-runners` adds any executable of the environment:
//!
//! ```toml
//! [tool.stew.ci]
//! mypy = false
//! pytest = { marker-expression = "not docker" }
//! custom-runners = { flake8 = true, bandit = { check-args = ["--quiet", "--recursive", "."] } }
//! ```

use super::runners::{
    AnyRunner, BlackRunner, CheckOutdatedRunner, CiRunner, MypyRunner, OfflineBuildRunner,
    PoetryCheckRunner, PytestRunner,
};
use crate::flex::{self, factory_for, lookup_key, Flex, FlexError, SerializationMetadata};
use crate::stew::StewError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// The builtin runners: config key and runner name
const BUILTINS: [(&str, &str); 6] = [
    ("mypy", "mypy"),
    ("check_outdated", "check-outdated"),
    ("pytest", "pytest"),
    ("poetry_check", "poetry-check"),
    ("offline_build", "offline-build"),
    ("black", "black"),
];

fn enabled() -> Value {
    Value::Bool(true)
}

fn disabled() -> Value {
    Value::Bool(false)
}

#[derive(Debug, Deserialize)]
struct RawCiConfig {
    #[serde(default)]
    disabled: bool,
    #[serde(default = "enabled")]
    mypy: Value,
    #[serde(default = "enabled")]
    check_outdated: Value,
    #[serde(default = "disabled")]
    pytest: Value,
    #[serde(default = "enabled")]
    poetry_check: Value,
    #[serde(default = "disabled")]
    offline_build: Value,
    #[serde(default = "disabled")]
    black: Value,
    #[serde(default)]
    custom_runners: BTreeMap<String, Value>,
}

impl RawCiConfig {
    fn builtin(&self, key: &str) -> &Value {
        match key {
            "mypy" => &self.mypy,
            "check_outdated" => &self.check_outdated,
            "pytest" => &self.pytest,
            "poetry_check" => &self.poetry_check,
            "offline_build" => &self.offline_build,
            _ => &self.black,
        }
    }
}

/// `false`/`null` disable, `true` enables with defaults, a table configures
fn toggle(name: &str, value: &Value) -> Result<Option<Map<String, Value>>, StewError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(Map::new())),
        Value::Object(options) => Ok(Some(options.clone())),
        other => Err(StewError::Usage(format!(
            "The ci runner {name} expects true, false or a table, not {other}."
        ))),
    }
}

/// The registry building builtin runners from their name
fn builtin_registry() -> Result<Flex, FlexError> {
    let registry = Flex::new();
    registry.register_concrete::<dyn CiRunner>("mypy", factory_for::<MypyRunner, dyn CiRunner>())?;
    registry.register_concrete::<dyn CiRunner>("check-outdated", factory_for::<CheckOutdatedRunner, dyn CiRunner>())?;
    registry.register_concrete::<dyn CiRunner>("pytest", factory_for::<PytestRunner, dyn CiRunner>())?;
    registry.register_concrete::<dyn CiRunner>("poetry-check", factory_for::<PoetryCheckRunner, dyn CiRunner>())?;
    registry.register_concrete::<dyn CiRunner>("offline-build", factory_for::<OfflineBuildRunner, dyn CiRunner>())?;
    registry.register_concrete::<dyn CiRunner>("black", factory_for::<BlackRunner, dyn CiRunner>())?;
    Ok(registry)
}

/// The runners of a project
#[derive(Debug, Clone, Default)]
pub struct CiConfig {
    disabled: bool,
    runners: Vec<Arc<dyn CiRunner>>,
}

impl CiConfig {
    /// Read `[tool.stew.ci]`; an empty table gives the default runners
    ///
    /// # Errors
    ///
    /// `Usage` for invalid toggles or custom runners named after a builtin,
    /// or the deserialization error of a runner's options.
    pub fn from_table(table: &Map<String, Value>) -> Result<Self, StewError> {
        let raw: RawCiConfig = flex::deserialize(Value::Object(table.clone()))?;
        let registry = builtin_registry()?;

        let mut runners: Vec<Arc<dyn CiRunner>> = Vec::new();
        for (key, name) in BUILTINS {
            let Some(options) = toggle(name, raw.builtin(key))? else {
                continue;
            };
            let metadata = SerializationMetadata::new(name);
            let runner = registry.deserialize_abstract_with::<dyn CiRunner>(Value::Object(options), Some(&metadata))?;
            runners.push(Arc::from(runner));
        }

        for (name, value) in &raw.custom_runners {
            let wanted = lookup_key(name);
            if wanted == "disabled" || BUILTINS.iter().any(|(key, _)| lookup_key(key) == wanted) {
                return Err(StewError::Usage(format!(
                    "Custom runner {name} conflicts with the builtin version."
                )));
            }
            let Some(mut options) = toggle(name, value)? else {
                continue;
            };
            options.insert("name".to_string(), Value::String(name.clone()));
            let runner = flex::deserialize::<AnyRunner>(Value::Object(options))?.validate()?;
            runners.push(Arc::new(runner));
        }

        debug!("ci runners: {runners:?}");
        Ok(Self {
            disabled: raw.disabled,
            runners,
        })
    }

    /// What pydev projects run: only the lock checks
    #[must_use]
    pub fn for_pydev() -> Self {
        let check_outdated: Arc<dyn CiRunner> = Arc::new(CheckOutdatedRunner::default());
        let poetry_check: Arc<dyn CiRunner> = Arc::new(PoetryCheckRunner::default());
        Self {
            disabled: false,
            runners: vec![check_outdated, poetry_check],
        }
    }

    /// The master switch
    #[must_use]
    pub fn disabled(&self) -> bool {
        self.disabled
    }

    /// The runners; those that can fix come first, as fixes move lines around
    pub fn runners(&self) -> impl Iterator<Item = &Arc<dyn CiRunner>> {
        let mut sorted: Vec<&Arc<dyn CiRunner>> = self.runners.iter().collect();
        sorted.sort_by_key(|runner| !runner.supports_auto_fix());
        sorted.into_iter()
    }

    /// The runner names, in launch order
    pub fn runner_names(&self) -> impl Iterator<Item = &str> {
        self.runners().map(|runner| runner.name())
    }
}
