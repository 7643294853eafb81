// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Runtime options of the command line tools
//!
//! Each option is a setting read from the environment (`STEW_VERBOSE`,
//! `PYPI_CLI_INDEX`, ...) that global flags may override.

use crate::settings::{BoolSetting, SettingsContext, SettingsError, StringSetting};
use serde_json::Value;

/// The index queried when none is configured
pub const DEFAULT_PYPI_INDEX: &str = "https://pypi.org";

// =============================================================================
// stew
// =============================================================================

/// Options shared by the `stew` commands
#[derive(Debug)]
pub struct StewConfig {
    context: SettingsContext,
    verbose: BoolSetting,
    ci_mode: BoolSetting,
    dry_run: BoolSetting,
}

impl StewConfig {
    /// The options, read from `context`
    ///
    /// # Errors
    ///
    /// Only fails if a fallback cannot be converted.
    pub fn new(context: SettingsContext) -> Result<Self, SettingsError> {
        Ok(Self {
            context,
            verbose: BoolSetting::new("stew.verbose").with_fallback(false)?,
            ci_mode: BoolSetting::new("stew.ci.mode").with_fallback(false)?,
            dry_run: BoolSetting::new("stew.dry.run").with_fallback(false)?,
        })
    }

    /// The options, read from the process environment
    ///
    /// # Errors
    ///
    /// See [`StewConfig::new`].
    pub fn from_process() -> Result<Self, SettingsError> {
        Self::new(SettingsContext::process())
    }

    /// Apply the global flags; a flag that was not given keeps the environment's value
    #[must_use]
    pub fn with_flags(self, verbose: bool, ci_mode: bool, dry_run: bool) -> Self {
        for (setting, flag) in [(&self.verbose, verbose), (&self.ci_mode, ci_mode), (&self.dry_run, dry_run)] {
            if flag {
                setting.set(Some(Value::Bool(true)));
            }
        }
        self
    }

    /// Show what is happening under the hood
    ///
    /// # Errors
    ///
    /// Fails when the environment holds something that is not a boolean.
    pub fn verbose(&self) -> Result<bool, SettingsError> {
        self.verbose.get_if_set(&self.context, false)
    }

    /// Running unattended: nothing gets fixed, only checked
    ///
    /// # Errors
    ///
    /// Fails when the environment holds something that is not a boolean.
    pub fn ci_mode(&self) -> Result<bool, SettingsError> {
        self.ci_mode.get_if_set(&self.context, false)
    }

    /// Report what would change without writing anything
    ///
    /// # Errors
    ///
    /// Fails when the environment holds something that is not a boolean.
    pub fn dry_run(&self) -> Result<bool, SettingsError> {
        self.dry_run.get_if_set(&self.context, false)
    }
}

// =============================================================================
// pypi
// =============================================================================

/// Options of the `pypi` commands
#[derive(Debug)]
pub struct PypiConfig {
    context: SettingsContext,
    index: StringSetting,
}

impl PypiConfig {
    /// The options, read from `context`
    ///
    /// # Errors
    ///
    /// Only fails if the fallback cannot be converted.
    pub fn new(context: SettingsContext) -> Result<Self, SettingsError> {
        Ok(Self {
            context,
            index: StringSetting::new("pypi.cli.index").with_fallback(DEFAULT_PYPI_INDEX)?,
        })
    }

    /// The options, read from the process environment
    ///
    /// # Errors
    ///
    /// See [`PypiConfig::new`].
    pub fn from_process() -> Result<Self, SettingsError> {
        Self::new(SettingsContext::process())
    }

    /// Override the index with the `--index` flag, when given
    #[must_use]
    pub fn with_index(self, index: Option<String>) -> Self {
        if let Some(index) = index {
            self.index.set(Some(Value::String(index)));
        }
        self
    }

    /// The index host, such as `https://pypi.org`
    ///
    /// # Errors
    ///
    /// Fails when the value is empty or its redirection cannot be resolved.
    pub fn index(&self) -> Result<String, SettingsError> {
        self.index.get_if_set(&self.context, DEFAULT_PYPI_INDEX.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MapEnvironment;
    use std::sync::Arc;

    fn make_test_context(pairs: &[(&str, &str)]) -> SettingsContext {
        SettingsContext::new(Arc::new(MapEnvironment::from_pairs(pairs.iter().copied())))
    }

    #[test]
    fn test_stew_defaults() {
        let config = StewConfig::new(make_test_context(&[])).unwrap();
        assert!(!config.verbose().unwrap());
        assert!(!config.ci_mode().unwrap());
        assert!(!config.dry_run().unwrap());
    }

    #[test]
    fn test_stew_environment() {
        let config = StewConfig::new(make_test_context(&[("STEW_VERBOSE", "yes"), ("stew_dry_run", "1")])).unwrap();
        assert!(config.verbose().unwrap());
        assert!(config.dry_run().unwrap());
        assert!(!config.ci_mode().unwrap());
    }

    #[test]
    fn test_flags_override_environment() {
        let config = StewConfig::new(make_test_context(&[("STEW_CI_MODE", "false")]))
            .unwrap()
            .with_flags(false, true, false);
        assert!(config.ci_mode().unwrap());
        assert!(!config.verbose().unwrap());
    }

    #[test]
    fn test_invalid_boolean() {
        let config = StewConfig::new(make_test_context(&[("STEW_DRY_RUN", "maybe")])).unwrap();
        assert!(config.dry_run().is_err());
    }

    #[test]
    fn test_pypi_index() {
        let config = PypiConfig::new(make_test_context(&[])).unwrap();
        assert_eq!(config.index().unwrap(), DEFAULT_PYPI_INDEX);

        let config = PypiConfig::new(make_test_context(&[("PYPI_CLI_INDEX", "https://test.pypi.org")])).unwrap();
        assert_eq!(config.index().unwrap(), "https://test.pypi.org");

        let config = config.with_index(Some("http://localhost:8080".to_string()));
        assert_eq!(config.index().unwrap(), "http://localhost:8080");
    }
}
