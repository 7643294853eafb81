// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Flexible deserialization of loosely-cased payloads
//!
//! Payloads coming from config files, CLIs or other teams rarely agree on
//! casing. [`deserialize`] maps `{"Name": "J", "SocialNumber": 1}` onto a
//! struct with `name` and `social_number` fields, recursing into nested
//! structs, enums, lists, maps and options.
//!
//! Abstract targets (trait objects) are resolved through a [`Flex`]
//! registry, either by a subclass adapter that inspects the payload or by
//! [`SerializationMetadata`] captured when the value was serialized.

mod casing;
mod de;
mod enums;
mod metadata;
mod one_or_many;

pub use casing::{lookup_key, unflex, KeyLookup, IGNORED_KEY_CHARACTERS};
pub use de::FlexDeserializer;
pub use enums::{deserialize_enum, resolve_enum, FlexEnum};
pub use metadata::{Concrete, SerializationMetadata};
pub use one_or_many::OneOrMany;

use serde::de::{DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

/// Flexible deserialization errors
#[derive(Debug, Error)]
pub enum FlexError {
    /// Reported by a `Deserialize` implementation
    #[error("{0}")]
    Message(String),

    /// Reported while reading a JSON value
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An abstract type has neither a subclass adapter nor metadata
    #[error("Cannot deserialize the abstract type {type_name}: register a subclass adapter or provide serialization metadata.")]
    AbstractType {
        /// The abstract type
        type_name: &'static str,
    },

    /// A subclass adapter was registered twice for the same abstract type
    #[error("A subclass adapter is already registered for {type_name}.")]
    AdapterAlreadyRegistered {
        /// The abstract type
        type_name: &'static str,
    },

    /// The subclass adapter did not recognize the payload
    #[error("The subclass adapter for {type_name} could not select a concrete type for this payload.")]
    NoConcreteType {
        /// The abstract type
        type_name: &'static str,
    },

    /// The metadata names a concrete type that was never registered
    #[error("No concrete type named {concrete:?} is registered for {type_name}.")]
    UnknownConcreteType {
        /// The abstract type
        type_name: &'static str,
        /// The name found in the metadata
        concrete: String,
    },

    /// A [`Dyn`] field was deserialized outside of [`Flex::deserialize`]
    #[error("Abstract fields can only be deserialized through a Flex registry.")]
    NoActiveRegistry,
}

impl serde::de::Error for FlexError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Message(msg.to_string())
    }
}

/// Deserialize `value` into `T`, matching keys loosely
///
/// # Errors
///
/// Whatever `T`'s `Deserialize` implementation reports.
pub fn deserialize<T: DeserializeOwned>(value: Value) -> Result<T, FlexError> {
    T::deserialize(FlexDeserializer::new(value))
}

// =============================================================================
// Abstract types
// =============================================================================

/// Builds a concrete value behind the abstract type `B`
pub type Factory<B> = Arc<dyn Fn(Value, &Flex) -> Result<Box<B>, FlexError> + Send + Sync>;

type Selector<B> = Arc<dyn Fn(&Value) -> Option<Factory<B>> + Send + Sync>;

/// A factory that flex-deserializes `C` and boxes it as `B`
///
/// Implement `From<C> for Box<dyn Trait>` to make a concrete type eligible.
/// When `C` was selected by metadata, its field metadata resolves the
/// abstract fields of `C`.
#[must_use]
pub fn factory_for<C, B>() -> Factory<B>
where
    C: DeserializeOwned + 'static,
    B: ?Sized + 'static,
    Box<B>: From<C>,
{
    Arc::new(|value: Value, flex: &Flex| -> Result<Box<B>, FlexError> {
        let concrete = match selected_metadata() {
            Some(metadata) => flex.deserialize_with_metadata::<C>(value, &metadata)?,
            None => flex.deserialize::<C>(value)?,
        };
        Ok(Box::<B>::from(concrete))
    })
}

struct Adapters<B: ?Sized> {
    selector: Option<Selector<B>>,
    concrete: HashMap<String, Factory<B>>,
}

impl<B: ?Sized> Default for Adapters<B> {
    fn default() -> Self {
        Self {
            selector: None,
            concrete: HashMap::new(),
        }
    }
}

type Registry = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Registry of subclass adapters and concrete factories for abstract types
///
/// Cloning is cheap and clones share the same registrations.
#[derive(Clone, Default)]
pub struct Flex {
    registry: Arc<RwLock<Registry>>,
}

impl fmt::Debug for Flex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Flex").field("abstract_types", &count).finish()
    }
}

/// A registry in use, and the metadata that selected the concrete type being built
struct Active {
    flex: Flex,
    selected: Option<SerializationMetadata>,
}

thread_local! {
    static ACTIVE: RefCell<Vec<Active>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a registry active for nested [`Dyn`] fields
struct ActiveGuard;

impl ActiveGuard {
    fn push(flex: &Flex, selected: Option<SerializationMetadata>) -> Self {
        ACTIVE.with(|active| {
            active.borrow_mut().push(Active {
                flex: flex.clone(),
                selected,
            });
        });
        Self
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

fn active_registry() -> Option<Flex> {
    ACTIVE.with(|active| active.borrow().last().map(|top| top.flex.clone()))
}

fn selected_metadata() -> Option<SerializationMetadata> {
    ACTIVE.with(|active| active.borrow().last().and_then(|top| top.selected.clone()))
}

impl Flex {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback selecting a concrete type for payloads of `B`
    ///
    /// The selector receives the raw payload and returns the factory to use,
    /// or `None` when it does not recognize it.
    ///
    /// # Errors
    ///
    /// Fails when `B` already has a subclass adapter.
    pub fn register_subclass_adapter<B, F>(&self, selector: F) -> Result<(), FlexError>
    where
        B: ?Sized + 'static,
        F: Fn(&Value) -> Option<Factory<B>> + Send + Sync + 'static,
    {
        self.with_adapters::<B, _>(|adapters| {
            if adapters.selector.is_some() {
                return Err(FlexError::AdapterAlreadyRegistered {
                    type_name: type_name::<B>(),
                });
            }
            adapters.selector = Some(Arc::new(selector));
            Ok(())
        })?;
        debug!(abstract_type = type_name::<B>(), "registered subclass adapter");
        Ok(())
    }

    /// Register a concrete factory for `B` under `name`, used with metadata
    ///
    /// # Errors
    ///
    /// Fails when the registry lock is unusable.
    pub fn register_concrete<B: ?Sized + 'static>(
        &self,
        name: impl Into<String>,
        factory: Factory<B>,
    ) -> Result<(), FlexError> {
        let name = name.into();
        self.with_adapters::<B, _>(|adapters| {
            adapters.concrete.insert(name, factory);
            Ok(())
        })
    }

    /// Deserialize `T`, resolving nested [`Dyn`] fields through this registry
    ///
    /// # Errors
    ///
    /// Deserialization errors, or [`FlexError::AbstractType`] for abstract
    /// fields this registry cannot resolve.
    pub fn deserialize<T: DeserializeOwned>(&self, value: Value) -> Result<T, FlexError> {
        let _active = ActiveGuard::push(self, None);
        T::deserialize(FlexDeserializer::new(value))
    }

    /// Deserialize `T`, resolving its [`Dyn`] fields from `metadata` first
    ///
    /// Fields listed in `metadata.fields` use the concrete type recorded
    /// there, recursively. Other abstract fields fall back to the subclass
    /// adapters.
    ///
    /// # Errors
    ///
    /// Same as [`Flex::deserialize`], plus [`FlexError::UnknownConcreteType`]
    /// when a field names an unregistered type.
    pub fn deserialize_with_metadata<T: DeserializeOwned>(
        &self,
        value: Value,
        metadata: &SerializationMetadata,
    ) -> Result<T, FlexError> {
        let _active = ActiveGuard::push(self, None);
        T::deserialize(FlexDeserializer::with_metadata(value, metadata.clone()))
    }

    /// Deserialize an abstract `B` through its subclass adapter
    ///
    /// # Errors
    ///
    /// [`FlexError::AbstractType`] without an adapter,
    /// [`FlexError::NoConcreteType`] when the adapter declines the payload.
    pub fn deserialize_abstract<B: ?Sized + 'static>(&self, value: Value) -> Result<Box<B>, FlexError> {
        self.deserialize_abstract_with(value, None)
    }

    /// Deserialize an abstract `B`, preferring metadata over the adapter
    ///
    /// # Errors
    ///
    /// Same as [`Flex::deserialize_abstract`], plus
    /// [`FlexError::UnknownConcreteType`] when the metadata names an
    /// unregistered type.
    pub fn deserialize_abstract_with<B: ?Sized + 'static>(
        &self,
        value: Value,
        metadata: Option<&SerializationMetadata>,
    ) -> Result<Box<B>, FlexError> {
        let abstract_type = type_name::<B>();
        let factory = match metadata {
            Some(metadata) => self
                .concrete::<B>(&metadata.type_name)
                .ok_or_else(|| FlexError::UnknownConcreteType {
                    type_name: abstract_type,
                    concrete: metadata.type_name.clone(),
                })?,
            None => {
                let selector = self.selector::<B>().ok_or(FlexError::AbstractType {
                    type_name: abstract_type,
                })?;
                selector(&value).ok_or(FlexError::NoConcreteType {
                    type_name: abstract_type,
                })?
            }
        };

        debug!(
            abstract_type,
            concrete = metadata.map(|metadata| metadata.type_name.as_str()),
            "deserializing abstract value"
        );
        let _active = ActiveGuard::push(self, metadata.cloned());
        factory(value, self)
    }

    fn with_adapters<B, R>(
        &self,
        f: impl FnOnce(&mut Adapters<B>) -> Result<R, FlexError>,
    ) -> Result<R, FlexError>
    where
        B: ?Sized + 'static,
    {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = registry
            .entry(TypeId::of::<B>())
            .or_insert_with(|| Box::new(Adapters::<B>::default()));
        let adapters = entry
            .downcast_mut::<Adapters<B>>()
            .ok_or_else(|| FlexError::Message(format!("corrupted registry entry for {}", type_name::<B>())))?;
        f(adapters)
    }

    fn selector<B: ?Sized + 'static>(&self) -> Option<Selector<B>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .get(&TypeId::of::<B>())?
            .downcast_ref::<Adapters<B>>()?
            .selector
            .clone()
    }

    fn concrete<B: ?Sized + 'static>(&self, name: &str) -> Option<Factory<B>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .get(&TypeId::of::<B>())?
            .downcast_ref::<Adapters<B>>()?
            .concrete
            .get(name)
            .cloned()
    }
}

/// A field holding an abstract value, resolved by the active [`Flex`] registry
///
/// Metadata recorded for the field selects the concrete type; otherwise the
/// subclass adapter does.
pub struct Dyn<B: ?Sized>(pub Box<B>);

impl<B: ?Sized> Dyn<B> {
    /// The boxed value
    #[must_use]
    pub fn into_inner(self) -> Box<B> {
        self.0
    }
}

impl<B: ?Sized> Deref for Dyn<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.0
    }
}

impl<B: ?Sized> DerefMut for Dyn<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.0
    }
}

impl<B: ?Sized + fmt::Debug> fmt::Debug for Dyn<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct DynVisitor<B: ?Sized>(PhantomData<fn() -> Box<B>>);

impl<'de, B: ?Sized + 'static> Visitor<'de> for DynVisitor<B> {
    type Value = Dyn<B>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "a payload of {}", type_name::<B>())
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, deserializer: D) -> Result<Dyn<B>, D::Error> {
        use serde::de::Error;

        let metadata = de::take_pending_metadata();
        let value = Value::deserialize(deserializer)?;
        let flex = active_registry().ok_or_else(|| D::Error::custom(FlexError::NoActiveRegistry))?;
        flex.deserialize_abstract_with::<B>(value, metadata.as_ref())
            .map(Dyn)
            .map_err(D::Error::custom)
    }
}

impl<'de, B: ?Sized + 'static> Deserialize<'de> for Dyn<B> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(de::DYN, DynVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    trait Shape: fmt::Debug {
        fn area(&self) -> f64;
    }

    #[derive(Debug, Deserialize)]
    struct Circle {
        radius: f64,
    }

    #[derive(Debug, Deserialize)]
    struct Rectangle {
        width: f64,
        height: f64,
    }

    impl Shape for Circle {
        fn area(&self) -> f64 {
            3.0 * self.radius * self.radius
        }
    }

    impl Shape for Rectangle {
        fn area(&self) -> f64 {
            self.width * self.height
        }
    }

    impl From<Circle> for Box<dyn Shape> {
        fn from(value: Circle) -> Self {
            Box::new(value)
        }
    }

    impl From<Rectangle> for Box<dyn Shape> {
        fn from(value: Rectangle) -> Self {
            Box::new(value)
        }
    }

    #[derive(Debug, Deserialize)]
    struct Canvas {
        title: String,
        main_shape: Dyn<dyn Shape>,
        others: Vec<Dyn<dyn Shape>>,
    }

    fn make_test_flex() -> Flex {
        let flex = Flex::new();
        flex.register_subclass_adapter::<dyn Shape, _>(|payload| {
            let payload = payload.as_object()?;
            if payload.keys().any(|key| lookup_key(key) == "radius") {
                Some(factory_for::<Circle, dyn Shape>())
            } else if payload.keys().any(|key| lookup_key(key) == "width") {
                Some(factory_for::<Rectangle, dyn Shape>())
            } else {
                None
            }
        })
        .unwrap();
        flex
    }

    #[test]
    fn test_subclass_adapter_selects_concrete_type() {
        let flex = make_test_flex();
        let shape = flex
            .deserialize_abstract::<dyn Shape>(json!({"Radius": 2.0}))
            .unwrap();
        assert!((shape.area() - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nested_abstract_fields() {
        let flex = make_test_flex();
        let canvas: Canvas = flex
            .deserialize(json!({
                "Title": "demo",
                "MainShape": {"WIDTH": 2.0, "height": 3.0},
                "others": [{"radius": 1.0}],
            }))
            .unwrap();
        assert_eq!(canvas.title, "demo");
        assert!((canvas.main_shape.area() - 6.0).abs() < f64::EPSILON);
        assert_eq!(canvas.others.len(), 1);
    }

    #[test]
    fn test_abstract_without_adapter_or_metadata() {
        let flex = Flex::new();
        assert!(matches!(
            flex.deserialize_abstract::<dyn Shape>(json!({"radius": 1.0})),
            Err(FlexError::AbstractType { .. })
        ));
        assert!(deserialize::<Canvas>(json!({"title": "t", "main_shape": {}, "others": []})).is_err());
    }

    #[test]
    fn test_adapter_declining_payload() {
        let flex = make_test_flex();
        assert!(matches!(
            flex.deserialize_abstract::<dyn Shape>(json!({"sides": 3})),
            Err(FlexError::NoConcreteType { .. })
        ));
    }

    #[test]
    fn test_duplicate_adapter() {
        let flex = make_test_flex();
        let again = flex.register_subclass_adapter::<dyn Shape, _>(|_| None);
        assert!(matches!(again, Err(FlexError::AdapterAlreadyRegistered { .. })));
    }

    #[test]
    fn test_metadata_redirects_deserialization() {
        let flex = Flex::new();
        flex.register_concrete::<dyn Shape>("circle", factory_for::<Circle, dyn Shape>())
            .unwrap();

        let metadata = SerializationMetadata::new("circle");
        let shape = flex
            .deserialize_abstract_with::<dyn Shape>(json!({"RADIUS": 1.0}), Some(&metadata))
            .unwrap();
        assert!((shape.area() - 3.0).abs() < f64::EPSILON);

        let unknown = SerializationMetadata::new("hexagon");
        assert!(matches!(
            flex.deserialize_abstract_with::<dyn Shape>(json!({}), Some(&unknown)),
            Err(FlexError::UnknownConcreteType { .. })
        ));
    }

    trait Framed: fmt::Debug {
        fn shape_area(&self) -> f64;
    }

    #[derive(Debug, Deserialize)]
    struct Frame {
        shape: Dyn<dyn Shape>,
        caption: Option<String>,
    }

    impl Framed for Frame {
        fn shape_area(&self) -> f64 {
            self.shape.area()
        }
    }

    impl From<Frame> for Box<dyn Framed> {
        fn from(value: Frame) -> Self {
            Box::new(value)
        }
    }

    #[test]
    fn test_field_metadata_resolves_nested_abstract_fields() {
        let flex = Flex::new();
        flex.register_concrete::<dyn Framed>("frame", factory_for::<Frame, dyn Framed>())
            .unwrap();
        flex.register_concrete::<dyn Shape>("circle", factory_for::<Circle, dyn Shape>())
            .unwrap();

        let metadata = SerializationMetadata::new("frame")
            .with_field("shape", SerializationMetadata::new("circle"));
        let framed = flex
            .deserialize_abstract_with::<dyn Framed>(
                json!({"Shape": {"radius": 1.0}, "caption": "c"}),
                Some(&metadata),
            )
            .unwrap();
        assert!((framed.shape_area() - 3.0).abs() < f64::EPSILON);

        // no adapter, and nothing recorded for the field
        let bare = SerializationMetadata::new("frame");
        assert!(flex
            .deserialize_abstract_with::<dyn Framed>(json!({"shape": {"radius": 1.0}}), Some(&bare))
            .is_err());
    }

    #[test]
    fn test_deserialize_with_metadata_overrides_adapter() {
        let flex = make_test_flex();
        flex.register_concrete::<dyn Shape>("rectangle", factory_for::<Rectangle, dyn Shape>())
            .unwrap();

        // the adapter alone would pick a circle for main_shape
        let payload = json!({
            "title": "t",
            "MainShape": {"radius": 1.0, "width": 2.0, "height": 3.0},
            "others": [{"radius": 1.0}],
        });
        let metadata = SerializationMetadata::new("canvas")
            .with_field("main_shape", SerializationMetadata::new("rectangle"));
        let canvas: Canvas = flex.deserialize_with_metadata(payload.clone(), &metadata).unwrap();
        assert!((canvas.main_shape.area() - 6.0).abs() < f64::EPSILON);
        assert!((canvas.others[0].area() - 3.0).abs() < f64::EPSILON);

        let canvas: Canvas = flex.deserialize(payload).unwrap();
        assert!((canvas.main_shape.area() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metadata_snapshot_of_instance() {
        struct Holder;
        impl Concrete for Holder {
            fn concrete_name(&self) -> &'static str {
                "holder"
            }
            fn field_metadata(&self) -> std::collections::BTreeMap<String, SerializationMetadata> {
                [("shape".to_string(), SerializationMetadata::new("circle"))]
                    .into_iter()
                    .collect()
            }
        }

        let metadata = SerializationMetadata::from_instance(&Holder);
        assert_eq!(metadata.type_name, "holder");
        assert_eq!(metadata.field("shape"), Some(&SerializationMetadata::new("circle")));

        let text = serde_json::to_string(&metadata).unwrap();
        let back: SerializationMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(back, metadata);
    }
}
