// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Typed settings backed by environment variables
//!
//! A [`Setting`] is looked up by key in the environment of a [`SettingsContext`],
//! ignoring casing as well as the `.` and `_` separators: `redis.host` can be
//! provided as `REDIS_HOST`, `RedisHost` or `REDISHOST`.
//!
//! Values are resolved in this order:
//!
//! 1. a mocked value (see [`Setting::mock`])
//! 2. an override (see [`Setting::set`])
//! 3. the environment, trying the key and then each alternate key
//! 4. the fallback, which may be a value or a provider evaluated on each read
//!
//! The raw value then goes through the redirection adapters, is converted to
//! the setting's type and validated.

mod cast;
mod redirect;
mod source;
mod validation;

pub use cast::{
    AnyCast, BoolCast, Cast, DictCast, FloatCast, IntCast, ListCast, PathCast, StringCast,
};
pub use redirect::{AdapterRegistry, RedirectAdapter, ENVIRONMENT_SCHEME, MAX_REDIRECTS};
pub use source::{
    find_setting, normalize_key, EnvironmentSource, MapEnvironment, ProcessEnvironment,
    KEY_SEPARATORS,
};
pub use validation::{in_sequence, Validation};

use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// A raw configuration value, before conversion
pub type ConfigValue = Value;

/// A setting of any JSON-compatible value
pub type AnySetting = Setting<AnyCast>;
/// A boolean setting
pub type BoolSetting = Setting<BoolCast>;
/// A non-empty string setting
pub type StringSetting = Setting<StringCast>;
/// A whole number setting
pub type IntSetting = Setting<IntCast>;
/// A floating point setting
pub type FloatSetting = Setting<FloatCast>;
/// A JSON object setting
pub type DictSetting = Setting<DictCast>;
/// A JSON array setting
pub type ListSetting = Setting<ListCast>;
/// A filesystem path setting
pub type PathSetting = Setting<PathCast>;

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The value cannot be converted to the setting's type
    #[error("{setting}: Conversion to desired type failed ({reason}).")]
    TypeConversion {
        /// Display form of the setting, masked when sensitive
        setting: String,
        /// Why the conversion failed
        reason: String,
    },

    /// A mandatory setting has no value and no fallback
    #[error("Mandatory config item \"{key}\" is missing.")]
    Mandatory {
        /// The setting key
        key: String,
    },

    /// The value was refused by a validation callback
    #[error("{setting}: {reason}")]
    Validation {
        /// Display form of the setting, masked when sensitive
        setting: String,
        /// The reason returned by the callback
        reason: String,
    },

    /// A redirection chain went past [`MAX_REDIRECTS`]
    #[error("Too many redirects (over {limit}) while resolving \"{key}\".")]
    TooManyRedirects {
        /// The setting key being resolved
        key: String,
        /// The hop limit
        limit: usize,
    },

    /// A scheme was registered twice
    #[error("The scheme \"{scheme}\" is already registered.")]
    DuplicatedScheme {
        /// The offending scheme
        scheme: String,
    },

    /// A scheme that cannot be matched
    #[error("Invalid redirection scheme \"{scheme}\".")]
    InvalidScheme {
        /// The offending scheme
        scheme: String,
    },

    /// A key was empty
    #[error("Key should not be empty.")]
    EmptyKey,

    /// A custom adapter failed
    #[error("Redirection adapter failed: {0}")]
    Adapter(String),
}

// =============================================================================
// Context
// =============================================================================

/// The environment and adapters settings are resolved against
///
/// Processes usually build one with [`SettingsContext::process`] and pass it
/// by reference; tests build their own over a [`MapEnvironment`].
pub struct SettingsContext {
    environment: Arc<dyn EnvironmentSource>,
    adapters: AdapterRegistry,
}

impl SettingsContext {
    /// A context over `environment` with the built-in adapters
    #[must_use]
    pub fn new(environment: Arc<dyn EnvironmentSource>) -> Self {
        Self {
            environment,
            adapters: AdapterRegistry::with_builtins(),
        }
    }

    /// A context over the process environment
    #[must_use]
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessEnvironment))
    }

    /// The environment values are read from
    #[must_use]
    pub fn environment(&self) -> &dyn EnvironmentSource {
        self.environment.as_ref()
    }

    /// The redirection adapters
    #[must_use]
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }
}

impl Default for SettingsContext {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for SettingsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsContext")
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Setting
// =============================================================================

type Provider = dyn Fn() -> Option<ConfigValue> + Send + Sync;

enum Fallback {
    Value(ConfigValue),
    Provider(Box<Provider>),
}

#[derive(Default)]
struct State {
    overridden: Option<ConfigValue>,
    /// `Some(None)` mocks the setting as unset
    mocked: Option<Option<ConfigValue>>,
}

/// A typed, environment-backed configuration value
pub struct Setting<C: Cast> {
    key: String,
    alternate_keys: Vec<String>,
    fallback: Option<Fallback>,
    validations: Vec<Validation<C::Output>>,
    sensitive: bool,
    state: RwLock<State>,
    _cast: PhantomData<fn() -> C>,
}

impl<C: Cast> Setting<C> {
    /// A setting read from `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            alternate_keys: Vec::new(),
            fallback: None,
            validations: Vec::new(),
            sensitive: false,
            state: RwLock::new(State::default()),
            _cast: PhantomData,
        }
    }

    /// Keys tried, in order, when `key` is not found
    #[must_use]
    pub fn with_alternate_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// The value used when the environment does not provide one
    ///
    /// # Errors
    ///
    /// The fallback is converted right away so that a bad default is caught
    /// where the setting is declared rather than where it is read.
    pub fn with_fallback(mut self, fallback: impl Into<ConfigValue>) -> Result<Self, SettingsError> {
        let fallback = fallback.into();
        C::cast(&fallback).map_err(|reason| SettingsError::TypeConversion {
            setting: self.render(Some(&fallback)),
            reason,
        })?;
        self.fallback = Some(Fallback::Value(fallback));
        Ok(self)
    }

    /// A provider evaluated each time the fallback is needed
    #[must_use]
    pub fn with_fallback_fn<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<ConfigValue> + Send + Sync + 'static,
    {
        self.fallback = Some(Fallback::Provider(Box::new(provider)));
        self
    }

    /// Add a validation callback; all callbacks must accept the value
    #[must_use]
    pub fn with_validation<F>(mut self, validation: F) -> Self
    where
        F: Fn(&C::Output) -> Option<String> + Send + Sync + 'static,
    {
        self.validations.push(Box::new(validation));
        self
    }

    /// Hide the value when the setting is displayed
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// The main key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the value is hidden when displayed
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// The converted and validated value, `None` when not set
    ///
    /// # Errors
    ///
    /// Conversion, validation and redirection errors.
    pub fn value(&self, context: &SettingsContext) -> Result<Option<C::Output>, SettingsError> {
        let Some(raw) = self.raw_value(context)? else {
            return Ok(None);
        };
        let Some(resolved) = context.adapters().resolve(&self.key, raw, context)? else {
            return Ok(None);
        };

        let value = C::cast(&resolved).map_err(|reason| SettingsError::TypeConversion {
            setting: self.render(Some(&resolved)),
            reason,
        })?;
        self.validate(&value, &resolved)?;
        Ok(Some(value))
    }

    /// The value of a mandatory setting
    ///
    /// # Errors
    ///
    /// [`SettingsError::Mandatory`] when the setting is not set, plus the
    /// errors of [`Setting::value`].
    pub fn require(&self, context: &SettingsContext) -> Result<C::Output, SettingsError> {
        self.value(context)?.ok_or_else(|| SettingsError::Mandatory {
            key: self.key.clone(),
        })
    }

    /// True when a raw value is available
    ///
    /// Settings with a fallback are always set unless mocked as unset.
    /// Redirection adapters are not invoked and the value is not validated.
    #[must_use]
    pub fn is_set(&self, context: &SettingsContext) -> bool {
        matches!(self.raw_value(context), Ok(Some(_)))
    }

    /// True when the value is set and valid
    #[must_use]
    pub fn is_valid(&self, context: &SettingsContext) -> bool {
        matches!(self.value(context), Ok(Some(_)))
    }

    /// The value, or `default` when not set
    ///
    /// # Errors
    ///
    /// Same as [`Setting::value`].
    pub fn get_if_set(
        &self,
        context: &SettingsContext,
        default: C::Output,
    ) -> Result<C::Output, SettingsError> {
        Ok(self.value(context)?.unwrap_or(default))
    }

    /// Override the value; `None` restores the environment and fallback
    ///
    /// CLI applications use this to propagate global flags.
    pub fn set(&self, value: Option<ConfigValue>) {
        self.write_state().overridden = value;
    }

    /// Force the raw value until the returned guard is dropped
    ///
    /// `None` makes the setting read as unset, regardless of the environment
    /// or fallback.
    pub fn mock(&self, value: Option<ConfigValue>) -> MockGuard<'_, C> {
        let previous = self.write_state().mocked.replace(value);
        MockGuard {
            setting: self,
            previous,
        }
    }

    /// Display the setting along with its current raw value
    ///
    /// Sensitive settings show `<sensitive>` and unset ones `<not-set>`.
    #[must_use]
    pub fn display<'a>(&'a self, context: &'a SettingsContext) -> SettingDisplay<'a, C> {
        SettingDisplay {
            setting: self,
            context,
        }
    }

    fn raw_value(&self, context: &SettingsContext) -> Result<Option<ConfigValue>, SettingsError> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(mocked) = &state.mocked {
                return Ok(mocked.clone());
            }
            if let Some(overridden) = &state.overridden {
                return Ok(Some(overridden.clone()));
            }
        }

        let mut keys = Vec::with_capacity(1 + self.alternate_keys.len());
        keys.push(self.key.as_str());
        keys.extend(self.alternate_keys.iter().map(String::as_str));
        if let Some(found) = find_setting(context.environment(), &keys)? {
            return Ok(Some(Value::String(found)));
        }

        Ok(match &self.fallback {
            None => None,
            Some(Fallback::Value(value)) => Some(value.clone()),
            Some(Fallback::Provider(provider)) => provider(),
        })
    }

    fn validate(&self, value: &C::Output, raw: &ConfigValue) -> Result<(), SettingsError> {
        let reasons: Vec<String> = self
            .validations
            .iter()
            .filter_map(|validation| validation(value))
            .collect();
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Validation {
                setting: self.render(Some(raw)),
                reason: reasons.join("; "),
            })
        }
    }

    fn render(&self, value: Option<&ConfigValue>) -> String {
        let shown = match value {
            None => "<not-set>".to_string(),
            Some(_) if self.sensitive => "<sensitive>".to_string(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };
        format!("{}[{}] = {}", C::TYPE_NAME, self.key, shown)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Cast> fmt::Debug for Setting<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(C::TYPE_NAME)
            .field("key", &self.key)
            .field("alternate_keys", &self.alternate_keys)
            .field("sensitive", &self.sensitive)
            .finish_non_exhaustive()
    }
}

/// Restores a mocked setting when dropped
#[must_use = "the mock is undone as soon as the guard is dropped"]
pub struct MockGuard<'a, C: Cast> {
    setting: &'a Setting<C>,
    previous: Option<Option<ConfigValue>>,
}

impl<C: Cast> Drop for MockGuard<'_, C> {
    fn drop(&mut self) {
        self.setting.write_state().mocked = self.previous.take();
    }
}

/// See [`Setting::display`]
pub struct SettingDisplay<'a, C: Cast> {
    setting: &'a Setting<C>,
    context: &'a SettingsContext,
}

impl<C: Cast> fmt::Display for SettingDisplay<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.setting.raw_value(self.context).ok().flatten();
        f.write_str(&self.setting.render(raw.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_test_context() -> (Arc<MapEnvironment>, SettingsContext) {
        let environment = Arc::new(MapEnvironment::new());
        let context = SettingsContext::new(environment.clone());
        (environment, context)
    }

    #[test]
    fn test_environment_then_fallback() {
        let (env, ctx) = make_test_context();
        let setting = StringSetting::new("ut.value").with_fallback("fallback").unwrap();
        assert_eq!(setting.value(&ctx).unwrap().as_deref(), Some("fallback"));

        env.set("UT_VALUE", "from-env");
        assert_eq!(setting.value(&ctx).unwrap().as_deref(), Some("from-env"));
    }

    #[test]
    fn test_alternate_keys() {
        let (env, ctx) = make_test_context();
        let setting = IntSetting::new("ut.new").with_alternate_keys(["ut.old"]);
        assert_eq!(setting.value(&ctx).unwrap(), None);
        env.set("UT_OLD", "4");
        assert_eq!(setting.value(&ctx).unwrap(), Some(4));
        env.set("UT_NEW", "5");
        assert_eq!(setting.value(&ctx).unwrap(), Some(5));
    }

    #[test]
    fn test_bad_fallback_fails_early() {
        assert!(matches!(
            BoolSetting::new("ut").with_fallback("maybe"),
            Err(SettingsError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_fallback_provider_is_lazy() {
        let (_env, ctx) = make_test_context();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let setting = IntSetting::new("ut").with_fallback_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(json!(7))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(setting.value(&ctx).unwrap(), Some(7));
        assert_eq!(setting.value(&ctx).unwrap(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_override_and_clear() {
        let (env, ctx) = make_test_context();
        env.set("ut.flag", "no");
        let setting = BoolSetting::new("ut.flag").with_fallback(false).unwrap();
        assert_eq!(setting.value(&ctx).unwrap(), Some(false));

        setting.set(Some(json!(true)));
        assert_eq!(setting.value(&ctx).unwrap(), Some(true));

        setting.set(None);
        assert_eq!(setting.value(&ctx).unwrap(), Some(false));
        env.remove("ut.flag");
        assert_eq!(setting.value(&ctx).unwrap(), Some(false));
    }

    #[test]
    fn test_mock_restores_on_drop() {
        let (_env, ctx) = make_test_context();
        let setting = StringSetting::new("ut").with_fallback("real").unwrap();
        {
            let _guard = setting.mock(None);
            assert!(!setting.is_set(&ctx));
            assert_eq!(setting.value(&ctx).unwrap(), None);
            {
                let _inner = setting.mock(Some(json!("mocked")));
                assert_eq!(setting.value(&ctx).unwrap().as_deref(), Some("mocked"));
            }
            assert_eq!(setting.value(&ctx).unwrap(), None);
        }
        assert_eq!(setting.value(&ctx).unwrap().as_deref(), Some("real"));
    }

    #[test]
    fn test_mandatory() {
        let (_env, ctx) = make_test_context();
        let setting = StringSetting::new("ut.missing");
        let error = setting.require(&ctx).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Mandatory config item \"ut.missing\" is missing."
        );
        assert_eq!(setting.get_if_set(&ctx, "dflt".into()).unwrap(), "dflt");
    }

    #[test]
    fn test_validation() {
        let (env, ctx) = make_test_context();
        let setting = StringSetting::new("ut.stage")
            .with_validation(in_sequence(["dev", "prod"].map(String::from)));
        env.set("ut.stage", "prod");
        assert!(setting.is_valid(&ctx));

        env.set("ut.stage", "qa");
        assert!(setting.is_set(&ctx));
        assert!(!setting.is_valid(&ctx));
        let error = setting.value(&ctx).unwrap_err();
        assert_eq!(
            error.to_string(),
            "StringSetting[ut.stage] = qa: Valid values are : dev, prod"
        );
    }

    #[test]
    fn test_sensitive_display() {
        let (env, ctx) = make_test_context();
        let secret = StringSetting::new("ut.secret").sensitive();
        assert_eq!(secret.display(&ctx).to_string(), "StringSetting[ut.secret] = <not-set>");
        env.set("ut.secret", "hunter2");
        assert_eq!(secret.display(&ctx).to_string(), "StringSetting[ut.secret] = <sensitive>");
        assert_eq!(secret.value(&ctx).unwrap().as_deref(), Some("hunter2"));

        let plain = StringSetting::new("ut.secret");
        assert_eq!(plain.display(&ctx).to_string(), "StringSetting[ut.secret] = hunter2");
    }

    #[test]
    fn test_sensitive_conversion_error_is_masked() {
        let (env, ctx) = make_test_context();
        env.set("ut.port", "secret-text");
        let setting = IntSetting::new("ut.port").sensitive();
        let message = setting.value(&ctx).unwrap_err().to_string();
        assert!(message.starts_with("IntSetting[ut.port] = <sensitive>"));
        assert!(!message.contains("secret-text"));
    }

    #[test]
    fn test_redirect_not_called_on_is_set() {
        let (_env, ctx) = make_test_context();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        ctx.adapters()
            .register("lazy-evaluated::", true, move |value| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(json!(value)))
            })
            .unwrap();

        // a plain fallback would be converted eagerly, before any redirection
        let setting =
            BoolSetting::new("ut").with_fallback_fn(|| Some(json!("lazy-evaluated::yes")));
        assert!(setting.is_set(&ctx));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(setting.value(&ctx).unwrap(), Some(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_adapter_may_return_objects() {
        let (_env, ctx) = make_test_context();
        ctx.adapters()
            .register("return-dict::", true, |value| {
                serde_json::from_str(value)
                    .map(Some)
                    .map_err(|error| SettingsError::Adapter(error.to_string()))
            })
            .unwrap();

        let dict = DictSetting::new("ut").with_fallback_fn(|| Some(json!(r#"return-dict::{"success": true}"#)));
        assert_eq!(dict.value(&ctx).unwrap().unwrap().get("success"), Some(&json!(true)));

        let flag = BoolSetting::new("ut").with_fallback_fn(|| Some(json!(r#"return-dict::{"success": true}"#)));
        assert!(matches!(
            flag.value(&ctx),
            Err(SettingsError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_unstripped_recursion() {
        let (_env, ctx) = make_test_context();
        ctx.adapters()
            .register("key->", false, |value| {
                let target = match &value[5..] {
                    "first" => "key->second",
                    "second" => "key->expected",
                    _ => "goal!",
                };
                Ok(Some(json!(target)))
            })
            .unwrap();
        let setting = AnySetting::new("ut").with_fallback("key->first").unwrap();
        assert_eq!(setting.value(&ctx).unwrap(), Some(json!("goal!")));
    }
}
