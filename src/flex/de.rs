// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! A serde deserializer that matches keys loosely

use super::casing::KeyLookup;
use super::metadata::SerializationMetadata;
use super::one_or_many::ONE_OR_MANY;
use super::FlexError;
use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{
    self, DeserializeSeed, EnumAccess, IntoDeserializer, Unexpected, VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};
use std::cell::RefCell;
use tracing::trace;

/// Newtype name under which [`super::Dyn`] asks for its field metadata
pub(super) const DYN: &str = "$devkit::flex::Dyn";

thread_local! {
    static PENDING: RefCell<Option<SerializationMetadata>> = const { RefCell::new(None) };
}

/// Metadata handed to the [`super::Dyn`] being deserialized, if any
pub(super) fn take_pending_metadata() -> Option<SerializationMetadata> {
    PENDING.with(|pending| pending.borrow_mut().take())
}

/// Clears the pending metadata when a `Dyn` did not consume it
struct PendingGuard;

impl PendingGuard {
    fn set(metadata: Option<SerializationMetadata>) -> Self {
        PENDING.with(|pending| *pending.borrow_mut() = metadata);
        Self
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        PENDING.with(|pending| pending.borrow_mut().take());
    }
}

/// Deserializes a [`Value`] into any `Deserialize` type, matching keys loosely
///
/// Struct fields and enum variants are matched ignoring case, `_`, `-`, `.`
/// and spaces. Keys that match no field are dropped. An exact key always wins
/// over a loose one.
///
/// Types that buffer their input (`#[serde(untagged)]`, `#[serde(flatten)]`,
/// internally tagged enums) see the keys as-is.
///
/// With [`SerializationMetadata`], each struct field carries the metadata
/// recorded for it down to the [`super::Dyn`] fields it contains.
#[derive(Debug, Clone)]
pub struct FlexDeserializer {
    value: Value,
    metadata: Option<SerializationMetadata>,
}

impl FlexDeserializer {
    /// Wrap a value
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, metadata: None }
    }

    /// Wrap a value serialized from the concrete types in `metadata`
    #[must_use]
    pub fn with_metadata(value: Value, metadata: SerializationMetadata) -> Self {
        Self {
            value,
            metadata: Some(metadata),
        }
    }

    fn nested(value: Value, metadata: Option<SerializationMetadata>) -> Self {
        Self { value, metadata }
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(flag) => Unexpected::Bool(*flag),
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                Unexpected::Unsigned(unsigned)
            } else if let Some(signed) = number.as_i64() {
                Unexpected::Signed(signed)
            } else {
                Unexpected::Float(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(text) => Unexpected::Str(text),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn visit_array<'de, V: Visitor<'de>>(items: Vec<Value>, visitor: V) -> Result<V::Value, FlexError> {
    let mut seq = SeqDeserializer::<_, FlexError>::new(items.into_iter().map(FlexDeserializer::new));
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}

fn visit_object<'de, V: Visitor<'de>>(
    map: Map<String, Value>,
    metadata: Option<&SerializationMetadata>,
    visitor: V,
) -> Result<V::Value, FlexError> {
    let mut access = MapDeserializer::<_, FlexError>::new(map.into_iter().map(|(key, value)| {
        let field = metadata.and_then(|metadata| metadata.loose_field(&key)).cloned();
        (key, FlexDeserializer::nested(value, field))
    }));
    let value = visitor.visit_map(&mut access)?;
    access.end()?;
    Ok(value)
}

/// Rename the keys of `map` to the struct's field names
fn flex_keys(map: Map<String, Value>, fields: &'static [&'static str]) -> Map<String, Value> {
    let lookup = KeyLookup::new(fields);
    let mut flexed = Map::new();
    for (key, value) in map {
        if fields.contains(&key.as_str()) {
            flexed.insert(key, value);
            continue;
        }
        match lookup.get(&key) {
            Some(field) => {
                flexed.entry(field.to_string()).or_insert(value);
            }
            None => trace!(key = %key, "dropping key without a matching field"),
        }
    }
    flexed
}

/// The variant matching `name`: exactly, else loosely
fn resolve_variant(name: &str, variants: &'static [&'static str]) -> Option<&'static str> {
    if let Some(exact) = variants.iter().find(|variant| **variant == name) {
        return Some(*exact);
    }
    KeyLookup::new(variants)
        .get(name)
        .and_then(|found| variants.iter().find(|variant| **variant == found))
        .copied()
}

impl<'de> de::Deserializer<'de> for FlexDeserializer {
    type Error = FlexError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FlexError> {
        match self.value {
            Value::Array(items) => visit_array(items, visitor),
            Value::Object(map) => visit_object(map, None, visitor),
            other => de::Deserializer::deserialize_any(other, visitor).map_err(FlexError::from),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FlexError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            value => visitor.visit_some(FlexDeserializer::nested(value, self.metadata)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, FlexError> {
        match self.value {
            Value::Array(items) if name == ONE_OR_MANY => visit_array(items, visitor),
            value if name == DYN => {
                let _pending = PendingGuard::set(self.metadata);
                visitor.visit_newtype_struct(FlexDeserializer::new(value))
            }
            value => visitor.visit_newtype_struct(FlexDeserializer::nested(value, self.metadata)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FlexError> {
        match self.value {
            Value::Object(map) => visit_object(flex_keys(map, fields), self.metadata.as_ref(), visitor),
            Value::Array(items) => visit_array(items, visitor),
            other => Err(de::Error::invalid_type(unexpected(&other), &visitor)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FlexError> {
        let (variant, content) = match self.value {
            Value::String(variant) => (variant, None),
            Value::Object(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((variant, content)), None) => (variant, Some(content)),
                    _ => {
                        return Err(de::Error::invalid_value(
                            Unexpected::Map,
                            &"a map with a single key",
                        ))
                    }
                }
            }
            other => {
                return Err(de::Error::invalid_type(
                    unexpected(&other),
                    &"a string or a map with a single key",
                ))
            }
        };

        // unknown variants are left to serde, which reports the valid ones
        let variant = resolve_variant(&variant, variants).map_or(variant, str::to_string);
        visitor.visit_enum(FlexEnumAccess { variant, content })
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FlexError> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier
    }
}

impl<'de> IntoDeserializer<'de, FlexError> for FlexDeserializer {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

struct FlexEnumAccess {
    variant: String,
    content: Option<Value>,
}

impl<'de> EnumAccess<'de> for FlexEnumAccess {
    type Error = FlexError;
    type Variant = FlexVariantAccess;

    fn variant_seed<S: DeserializeSeed<'de>>(
        self,
        seed: S,
    ) -> Result<(S::Value, Self::Variant), FlexError> {
        let deserializer: StringDeserializer<FlexError> = self.variant.into_deserializer();
        let variant = seed.deserialize(deserializer)?;
        Ok((
            variant,
            FlexVariantAccess {
                content: self.content,
            },
        ))
    }
}

struct FlexVariantAccess {
    content: Option<Value>,
}

impl<'de> VariantAccess<'de> for FlexVariantAccess {
    type Error = FlexError;

    fn unit_variant(self) -> Result<(), FlexError> {
        match self.content {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, FlexError> {
        match self.content {
            Some(content) => seed.deserialize(FlexDeserializer::new(content)),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"newtype variant",
            )),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, FlexError> {
        match self.content {
            Some(Value::Array(items)) => visit_array(items, visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"tuple variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"tuple variant",
            )),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FlexError> {
        match self.content {
            Some(content) => {
                de::Deserializer::deserialize_struct(FlexDeserializer::new(content), "", fields, visitor)
            }
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"struct variant",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn flex<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, FlexError> {
        T::deserialize(FlexDeserializer::new(value))
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        social_number: u64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    enum Shape {
        Circle,
        SquareBox,
        Sized(u32),
        Point { x_pos: i32, y_pos: i32 },
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Drawing {
        title_text: Option<String>,
        shapes: Vec<Shape>,
        owners: BTreeMap<String, Person>,
    }

    #[test]
    fn test_struct_keys_are_flexed() {
        let person: Person = flex(json!({"Name": "J", "SocialNumber": 1})).unwrap();
        assert_eq!(
            person,
            Person {
                name: "J".to_string(),
                social_number: 1
            }
        );

        let person: Person = flex(json!({"NAME": "J", "social-number": 1, "extra": true})).unwrap();
        assert_eq!(person.social_number, 1);
    }

    #[test]
    fn test_exact_key_wins() {
        let person: Person = flex(json!({"Name": "loose", "name": "exact", "social_number": 2})).unwrap();
        assert_eq!(person.name, "exact");
    }

    #[test]
    fn test_enum_variants_are_flexed() {
        assert_eq!(flex::<Shape>(json!("circle")).unwrap(), Shape::Circle);
        assert_eq!(flex::<Shape>(json!("square_box")).unwrap(), Shape::SquareBox);
        assert_eq!(flex::<Shape>(json!({"sized": 3})).unwrap(), Shape::Sized(3));
        assert_eq!(
            flex::<Shape>(json!({"POINT": {"XPos": 1, "y-pos": 2}})).unwrap(),
            Shape::Point { x_pos: 1, y_pos: 2 }
        );
        assert!(flex::<Shape>(json!("triangle")).is_err());
    }

    #[test]
    fn test_nested_structures() {
        let drawing: Drawing = flex(json!({
            "TitleText": null,
            "Shapes": ["Circle", {"Sized": 2}],
            "owners": {"Main": {"name": "A", "SOCIAL_NUMBER": 3}},
        }))
        .unwrap();
        assert_eq!(drawing.title_text, None);
        assert_eq!(drawing.shapes, vec![Shape::Circle, Shape::Sized(2)]);
        // map keys are data, not fields: they are left alone
        assert_eq!(drawing.owners["Main"].social_number, 3);
    }

    #[test]
    fn test_missing_field_is_reported() {
        let error = flex::<Person>(json!({"name": "J"})).unwrap_err();
        assert!(error.to_string().contains("social_number"));
    }

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(flex::<u8>(json!(3)).unwrap(), 3);
        assert_eq!(flex::<String>(json!("x")).unwrap(), "x");
        assert_eq!(flex::<Vec<bool>>(json!([true, false])).unwrap(), vec![true, false]);
        assert_eq!(flex::<Value>(json!({"A": 1})).unwrap(), json!({"A": 1}));
    }
}
