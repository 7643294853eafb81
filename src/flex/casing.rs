// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Loose key matching

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Characters that are not significant when matching keys
pub const IGNORED_KEY_CHARACTERS: [char; 4] = ['_', '-', '.', ' '];

/// Normalize a key for loose matching: lowercase, without `_`, `-`, `.` and spaces
///
/// `SocialNumber`, `social_number` and `Social-Number` all give `socialnumber`.
#[must_use]
pub fn lookup_key(key: &str) -> String {
    key.chars()
        .filter(|c| !IGNORED_KEY_CHARACTERS.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A lookup from normalized keys to the canonical names
#[derive(Debug, Clone, Default)]
pub struct KeyLookup {
    canonical: HashMap<String, String>,
}

impl KeyLookup {
    /// Build a lookup for the given canonical names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let canonical = names
            .into_iter()
            .map(|name| (lookup_key(name.as_ref()), name.as_ref().to_string()))
            .collect();
        Self { canonical }
    }

    /// The canonical name matching `key`, if any
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.canonical.get(&lookup_key(key)).map(String::as_str)
    }
}

/// Rename the keys of `dirty` to the canonical `names`
///
/// Keys without a match are dropped when `strip_extra` is set, and kept
/// untouched otherwise.
#[must_use]
pub fn unflex<S: AsRef<str>>(
    names: &[S],
    dirty: Map<String, Value>,
    strip_extra: bool,
) -> Map<String, Value> {
    let lookup = KeyLookup::new(names);
    let mut clean = Map::new();
    for (key, value) in dirty {
        match lookup.get(&key) {
            Some(canonical) => {
                clean.insert(canonical.to_string(), value);
            }
            None if strip_extra => {}
            None => {
                clean.insert(key, value);
            }
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_key() {
        assert_eq!(lookup_key("SocialNumber"), "socialnumber");
        assert_eq!(lookup_key("social_number"), "socialnumber");
        assert_eq!(lookup_key("Social-Number"), "socialnumber");
        assert_eq!(lookup_key("social. number"), "socialnumber");
    }

    #[test]
    fn test_unflex_strips_extra() {
        let dirty = json!({"Arg1": 10, "ARG_2": 20, "extra": 30});
        let Value::Object(dirty) = dirty else { unreachable!() };

        let clean = unflex(&["arg1", "arg2"], dirty.clone(), true);
        assert_eq!(Value::Object(clean), json!({"arg1": 10, "arg2": 20}));

        let kept = unflex(&["arg1", "arg2"], dirty, false);
        assert_eq!(Value::Object(kept), json!({"arg1": 10, "arg2": 20, "extra": 30}));
    }
}
