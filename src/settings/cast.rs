// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Conversions from raw configuration values to typed setting values

use super::ConfigValue;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A conversion from a raw [`ConfigValue`] to the typed value of a setting
///
/// Conversion failures are reported as a plain reason; the caller wraps it
/// into a [`super::SettingsError::TypeConversion`] naming the setting.
pub trait Cast {
    /// The typed value produced by this conversion
    type Output: Clone;

    /// Name used when displaying a setting of this type (e.g. `BoolSetting`)
    const TYPE_NAME: &'static str;

    /// Convert a raw value
    ///
    /// # Errors
    ///
    /// Returns the reason when the value cannot be represented as `Output`.
    fn cast(value: &ConfigValue) -> Result<Self::Output, String>;
}

/// Render scalar values the way they would appear in an environment variable
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Passes the raw value through untouched
#[derive(Debug, Clone, Copy)]
pub struct AnyCast;

impl Cast for AnyCast {
    type Output = ConfigValue;
    const TYPE_NAME: &'static str = "AnySetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        Ok(value.clone())
    }
}

/// yes/no/true/false/1/0/y/n, case-insensitive; surrounding blanks are refused
#[derive(Debug, Clone, Copy)]
pub struct BoolCast;

impl Cast for BoolCast {
    type Output = bool;
    const TYPE_NAME: &'static str = "BoolSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        if let Value::Bool(flag) = value {
            return Ok(*flag);
        }
        let text = scalar_text(value)
            .ok_or_else(|| format!("cannot convert a {} to a boolean", kind_of(value)))?;
        match text.to_lowercase().as_str() {
            "true" | "yes" | "1" | "y" => Ok(true),
            "false" | "no" | "0" | "n" => Ok(false),
            other => Err(format!("{other:?} is not a boolean value")),
        }
    }
}

/// Non-empty strings; scalars are rendered as text
#[derive(Debug, Clone, Copy)]
pub struct StringCast;

impl Cast for StringCast {
    type Output = String;
    const TYPE_NAME: &'static str = "StringSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        let text = scalar_text(value)
            .ok_or_else(|| format!("cannot convert objects of type {}", kind_of(value)))?;
        if text.is_empty() {
            return Err("string settings cannot be empty".to_string());
        }
        Ok(text)
    }
}

/// Whole numbers; anything containing a dot is refused, even `0.0`
#[derive(Debug, Clone, Copy)]
pub struct IntCast;

impl Cast for IntCast {
    type Output = i64;
    const TYPE_NAME: &'static str = "IntSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        let text = scalar_text(value)
            .ok_or_else(|| format!("cannot convert a {} to an integer", kind_of(value)))?;
        if text.contains('.') {
            return Err(format!("{text:?} is not a whole number"));
        }
        text.trim()
            .parse::<i64>()
            .map_err(|error| format!("{text:?}: {error}"))
    }
}

/// Floating point numbers; booleans are refused
#[derive(Debug, Clone, Copy)]
pub struct FloatCast;

impl Cast for FloatCast {
    type Output = f64;
    const TYPE_NAME: &'static str = "FloatSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        match value {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| format!("{number} cannot be represented as a float")),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|error| format!("{text:?}: {error}")),
            other => Err(format!("cannot convert a {} to a float", kind_of(other))),
        }
    }
}

/// JSON objects, given as-is or as a JSON string
#[derive(Debug, Clone, Copy)]
pub struct DictCast;

impl Cast for DictCast {
    type Output = Map<String, Value>;
    const TYPE_NAME: &'static str = "DictSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        let parsed = match value {
            Value::String(text) => {
                serde_json::from_str::<Value>(text).map_err(|error| error.to_string())?
            }
            other => other.clone(),
        };
        match parsed {
            Value::Object(map) => Ok(map),
            other => Err(format!("expected a dict, got a {}", kind_of(&other))),
        }
    }
}

/// JSON arrays, given as-is or as a JSON string
#[derive(Debug, Clone, Copy)]
pub struct ListCast;

impl Cast for ListCast {
    type Output = Vec<Value>;
    const TYPE_NAME: &'static str = "ListSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        let parsed = match value {
            Value::String(text) => {
                serde_json::from_str::<Value>(text).map_err(|error| error.to_string())?
            }
            other => other.clone(),
        };
        match parsed {
            Value::Array(items) => Ok(items),
            other => Err(format!("expected a list, got a {}", kind_of(&other))),
        }
    }
}

/// Filesystem paths; only strings qualify
#[derive(Debug, Clone, Copy)]
pub struct PathCast;

impl Cast for PathCast {
    type Output = PathBuf;
    const TYPE_NAME: &'static str = "PathSetting";

    fn cast(value: &ConfigValue) -> Result<Self::Output, String> {
        match value {
            Value::String(text) => Ok(PathBuf::from(text)),
            other => Err(format!("cannot convert a {} to a path", kind_of(other))),
        }
    }
}
