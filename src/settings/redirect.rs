// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Scheme-based redirection of setting values
//!
//! A value such as `env->OTHER_KEY` is not used literally: the adapter
//! registered for the `env->` scheme resolves it. The result may itself
//! start with a scheme, in which case it is resolved again.

use super::{find_setting, ConfigValue, SettingsContext, SettingsError};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Maximum number of hops a redirection chain may take
pub const MAX_REDIRECTS: usize = 50;

/// The scheme of the built-in adapter that reads another setting key
pub const ENVIRONMENT_SCHEME: &str = "env->";

type AdapterFn = dyn Fn(&str) -> Result<Option<ConfigValue>, SettingsError> + Send + Sync;

enum AdapterKind {
    /// Looks the payload up as another setting key
    Environment,
    /// User-provided resolver
    Custom(Box<AdapterFn>),
}

/// A registered scheme and the resolver behind it
pub struct RedirectAdapter {
    scheme: String,
    strip_scheme: bool,
    kind: AdapterKind,
}

impl RedirectAdapter {
    /// The scheme prefix this adapter handles
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Whether the scheme is removed before the adapter sees the value
    #[must_use]
    pub fn strips_scheme(&self) -> bool {
        self.strip_scheme
    }

    /// The part of `value` handed to the resolver, if the scheme matches
    fn payload<'v>(&self, value: &'v str) -> Option<&'v str> {
        let length = self.scheme.len();
        let prefix = value.as_bytes().get(..length)?;
        if !prefix.eq_ignore_ascii_case(self.scheme.as_bytes()) {
            return None;
        }
        if self.strip_scheme {
            value.get(length..)
        } else {
            Some(value)
        }
    }

    fn resolve(
        &self,
        payload: &str,
        context: &SettingsContext,
    ) -> Result<Option<ConfigValue>, SettingsError> {
        match &self.kind {
            AdapterKind::Environment => {
                Ok(find_setting(context.environment(), &[payload])?.map(Value::String))
            }
            AdapterKind::Custom(resolver) => resolver(payload),
        }
    }
}

impl std::fmt::Debug for RedirectAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectAdapter")
            .field("scheme", &self.scheme)
            .field("strip_scheme", &self.strip_scheme)
            .finish_non_exhaustive()
    }
}

/// The adapters known to a [`SettingsContext`]
///
/// Append-only: adapters can be registered but never removed.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: RwLock<Vec<Arc<RedirectAdapter>>>,
}

impl AdapterRegistry {
    /// A registry without any adapter, not even `env->`
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `env->` adapter
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.push(RedirectAdapter {
            scheme: ENVIRONMENT_SCHEME.to_string(),
            strip_scheme: true,
            kind: AdapterKind::Environment,
        });
        registry
    }

    /// Register a resolver for `scheme`
    ///
    /// When `strip_scheme` is false the resolver receives the full value,
    /// scheme included.
    ///
    /// # Errors
    ///
    /// Fails when the scheme is empty or already registered (case-insensitive).
    pub fn register<F>(&self, scheme: &str, strip_scheme: bool, resolver: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Result<Option<ConfigValue>, SettingsError> + Send + Sync + 'static,
    {
        if scheme.is_empty() {
            return Err(SettingsError::InvalidScheme {
                scheme: scheme.to_string(),
            });
        }
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        if adapters
            .iter()
            .any(|adapter| adapter.scheme.eq_ignore_ascii_case(scheme))
        {
            return Err(SettingsError::DuplicatedScheme {
                scheme: scheme.to_string(),
            });
        }
        adapters.push(Arc::new(RedirectAdapter {
            scheme: scheme.to_string(),
            strip_scheme,
            kind: AdapterKind::Custom(Box::new(resolver)),
        }));
        Ok(())
    }

    /// Registered schemes, in registration order
    #[must_use]
    pub fn schemes(&self) -> Vec<String> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|adapter| adapter.scheme.clone())
            .collect()
    }

    fn push(&self, adapter: RedirectAdapter) {
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(adapter));
    }

    /// First adapter whose scheme prefixes `value`
    fn matching(&self, value: &str) -> Option<Arc<RedirectAdapter>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|adapter| adapter.payload(value).is_some())
            .cloned()
    }

    /// Follow the redirection chain of `value`
    ///
    /// Non-string values and strings without a registered scheme are returned
    /// as-is. `Ok(None)` means an adapter decided the setting is not set.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::TooManyRedirects`] past [`MAX_REDIRECTS`] hops,
    /// or whatever error an adapter reports.
    pub fn resolve(
        &self,
        key: &str,
        value: ConfigValue,
        context: &SettingsContext,
    ) -> Result<Option<ConfigValue>, SettingsError> {
        let mut current = value;
        let mut hops = 0;

        loop {
            let Value::String(text) = &current else {
                return Ok(Some(current));
            };
            // the registry lock is released before calling out to the adapter
            let Some(adapter) = self.matching(text) else {
                return Ok(Some(current));
            };
            if hops == MAX_REDIRECTS {
                return Err(SettingsError::TooManyRedirects {
                    key: key.to_string(),
                    limit: MAX_REDIRECTS,
                });
            }
            hops += 1;

            let payload = adapter.payload(text).unwrap_or(text.as_str());
            trace!(key, scheme = %adapter.scheme, hop = hops, "redirecting setting");
            match adapter.resolve(payload, context)? {
                None => return Ok(None),
                Some(next) if next == current => return Ok(Some(next)),
                Some(next) => current = next,
            }
        }
    }
}
