// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Where settings read their raw values from

use super::SettingsError;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Separators that are not significant when matching keys
pub const KEY_SEPARATORS: [char; 2] = ['.', '_'];

/// A read-only view over environment-like variables
pub trait EnvironmentSource: Send + Sync {
    /// Exact lookup of a variable
    fn var(&self, key: &str) -> Option<String>;

    /// All variables, used for loose key matching
    fn vars(&self) -> Vec<(String, String)>;
}

/// The process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvironmentSource for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        // variables that are not valid unicode cannot be matched against a key anyway
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }
}

/// An in-memory environment, handy for tests and embedding
#[derive(Debug, Default)]
pub struct MapEnvironment {
    variables: RwLock<BTreeMap<String, String>>,
}

impl MapEnvironment {
    /// Create an empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an environment from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let variables = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            variables: RwLock::new(variables),
        }
    }

    /// Set a variable
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Remove a variable
    pub fn remove(&self, key: &str) {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl EnvironmentSource for MapEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Lowercase a key and drop its separators
///
/// `redis.host`, `REDIS_HOST`, `__REDIS...host_` and `RedisHost` all normalize
/// to `redishost`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !KEY_SEPARATORS.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Find the first key that has a value in the environment
///
/// Each key is tried exactly first, then loosely (casing and separators ignored),
/// before moving on to the next key.
///
/// # Errors
///
/// Returns [`SettingsError::EmptyKey`] when no keys are given or a key is empty.
pub fn find_setting<S: AsRef<str>>(
    environment: &dyn EnvironmentSource,
    keys: &[S],
) -> Result<Option<String>, SettingsError> {
    if keys.is_empty() {
        return Err(SettingsError::EmptyKey);
    }

    let mut variables: Option<Vec<(String, String)>> = None;
    for key in keys {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(SettingsError::EmptyKey);
        }
        if let Some(value) = environment.var(key) {
            return Ok(Some(value));
        }

        let wanted = normalize_key(key);
        let variables = variables.get_or_insert_with(|| environment.vars());
        if let Some((_, value)) = variables
            .iter()
            .find(|(name, _)| normalize_key(name) == wanted)
        {
            return Ok(Some(value.clone()));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("ut.test.setting"), "uttestsetting");
        assert_eq!(normalize_key("UT_teST.._setting"), "uttestsetting");
        assert_eq!(normalize_key("UTTESTSETTING"), "uttestsetting");
    }

    #[test]
    fn test_exact_match_wins() {
        let env = MapEnvironment::from_pairs([("redis.host", "exact"), ("REDIS_HOST", "loose")]);
        assert_eq!(
            find_setting(&env, &["redis.host"]).unwrap(),
            Some("exact".to_string())
        );
    }

    #[test]
    fn test_loose_match() {
        let env = MapEnvironment::from_pairs([("__REDIS...host_", "value")]);
        assert_eq!(
            find_setting(&env, &["redis.host"]).unwrap(),
            Some("value".to_string())
        );
    }

    #[test]
    fn test_alternate_keys_in_order() {
        let env = MapEnvironment::from_pairs([("second", "2"), ("third", "3")]);
        assert_eq!(
            find_setting(&env, &["first", "second", "third"]).unwrap(),
            Some("2".to_string())
        );
        assert_eq!(find_setting(&env, &["missing"]).unwrap(), None);
    }

    #[test]
    fn test_empty_key_is_an_error() {
        let env = MapEnvironment::new();
        assert!(matches!(
            find_setting(&env, &[""]),
            Err(SettingsError::EmptyKey)
        ));
        let no_keys: [&str; 0] = [];
        assert!(find_setting(&env, &no_keys).is_err());
    }
}
