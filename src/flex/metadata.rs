// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Snapshots of the concrete types behind abstract values

use super::casing::lookup_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Implemented by concrete types that may hide behind an abstract one
pub trait Concrete {
    /// The name the concrete factory is registered under
    fn concrete_name(&self) -> &'static str;

    /// Metadata of abstractly-typed fields, keyed by field name
    fn field_metadata(&self) -> BTreeMap<String, SerializationMetadata> {
        BTreeMap::new()
    }
}

/// The concrete type of a serialized value, and of its abstract fields
///
/// Stored next to a payload, it lets [`super::Flex`] rebuild the very same
/// concrete types without a subclass adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerializationMetadata {
    /// Registered name of the concrete type
    pub type_name: String,
    /// Metadata of abstractly-typed fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, SerializationMetadata>,
}

impl SerializationMetadata {
    /// Metadata for a concrete type without abstract fields
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Snapshot an instance
    pub fn from_instance<C: Concrete + ?Sized>(instance: &C) -> Self {
        Self {
            type_name: instance.concrete_name().to_string(),
            fields: instance.field_metadata(),
        }
    }

    /// Add the metadata of a field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, metadata: Self) -> Self {
        self.fields.insert(name.into(), metadata);
        self
    }

    /// Metadata of a field, if it was abstract
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Self> {
        self.fields.get(name)
    }

    /// Metadata of a field, matching its name exactly, else loosely
    #[must_use]
    pub fn loose_field(&self, name: &str) -> Option<&Self> {
        self.field(name).or_else(|| {
            let wanted = lookup_key(name);
            self.fields
                .iter()
                .find(|(key, _)| lookup_key(key) == wanted)
                .map(|(_, metadata)| metadata)
        })
    }
}
