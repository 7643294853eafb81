// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Enums whose members have both a name and a value

use super::casing::lookup_key;
use serde::de::{Deserialize, Deserializer, Error};
use serde_json::Value;

/// An enum whose members carry a name and a distinct value
///
/// Resolution tries, in order: an exact value, an exact name, a loose value
/// and finally a loose name. A loose match ignores case, `_`, `-`, `.` and
/// spaces.
pub trait FlexEnum: Sized + Copy + 'static {
    /// All members, in declaration order
    fn members() -> &'static [Self];

    /// The member's name
    fn name(self) -> &'static str;

    /// The member's value
    fn value(self) -> Value;
}

/// Resolve a raw value to an enum member
#[must_use]
pub fn resolve_enum<E: FlexEnum>(raw: &Value) -> Option<E> {
    let members = E::members();

    if let Some(member) = members.iter().find(|member| member.value() == *raw) {
        return Some(*member);
    }

    let text = raw.as_str()?;
    if let Some(member) = members.iter().find(|member| member.name() == text) {
        return Some(*member);
    }

    let wanted = lookup_key(text);
    members
        .iter()
        .find(|member| {
            member
                .value()
                .as_str()
                .is_some_and(|value| lookup_key(value) == wanted)
        })
        .or_else(|| members.iter().find(|member| lookup_key(member.name()) == wanted))
        .copied()
}

/// Deserialize a [`FlexEnum`]; use with `#[serde(deserialize_with = "...")]`
///
/// # Errors
///
/// Fails when no member matches.
pub fn deserialize_enum<'de, D, E>(deserializer: D) -> Result<E, D::Error>
where
    D: Deserializer<'de>,
    E: FlexEnum,
{
    let raw = Value::deserialize(deserializer)?;
    resolve_enum(&raw).ok_or_else(|| {
        let valid = E::members()
            .iter()
            .map(|member| member.name())
            .collect::<Vec<_>>()
            .join(", ");
        D::Error::custom(format!("{raw} does not match any of: {valid}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Level {
        ValueOne,
        ValueTwo,
        Numbered,
    }

    impl FlexEnum for Level {
        fn members() -> &'static [Self] {
            &[Self::ValueOne, Self::ValueTwo, Self::Numbered]
        }

        fn name(self) -> &'static str {
            match self {
                Self::ValueOne => "ValueOne",
                Self::ValueTwo => "ValueTwo",
                Self::Numbered => "Numbered",
            }
        }

        fn value(self) -> Value {
            match self {
                // deliberately the loose spelling of the other member's name
                Self::ValueOne => json!("value-two"),
                Self::ValueTwo => json!("second"),
                Self::Numbered => json!(3),
            }
        }
    }

    #[test]
    fn test_exact_value_beats_loose_name() {
        assert_eq!(resolve_enum::<Level>(&json!("value-two")), Some(Level::ValueOne));
    }

    #[test]
    fn test_resolution_order() {
        assert_eq!(resolve_enum::<Level>(&json!("ValueTwo")), Some(Level::ValueTwo));
        assert_eq!(resolve_enum::<Level>(&json!("SECOND")), Some(Level::ValueTwo));
        assert_eq!(resolve_enum::<Level>(&json!("value_two")), Some(Level::ValueOne));
        assert_eq!(resolve_enum::<Level>(&json!("numbered")), Some(Level::Numbered));
        assert_eq!(resolve_enum::<Level>(&json!(3)), Some(Level::Numbered));
        assert_eq!(resolve_enum::<Level>(&json!("nope")), None);
    }

    #[test]
    fn test_deserialize_with() {
        #[derive(Debug, serde::Deserialize)]
        struct Config {
            #[serde(deserialize_with = "deserialize_enum")]
            level: Level,
        }

        let config: Config = crate::flex::deserialize(json!({"Level": "second"})).unwrap();
        assert_eq!(config.level, Level::ValueTwo);
        assert!(crate::flex::deserialize::<Config>(json!({"level": "x"})).is_err());
    }
}
