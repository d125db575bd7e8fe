// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Polymorphic Component Descriptor
//!
//! A [`ComponentDescriptor`] embeds a component description of any registered
//! type inside another entity's payload. The nested entity travels as an
//! opaque serialized payload next to a type tag; the decoded form is
//! materialized lazily through a caller-supplied [`TypeRegistry`] and cached
//! until the payload is replaced.
//!
//! The registry is passed explicitly to every decode call. There is no global
//! type lookup.
//!
//! ```
//! use provisioner_core::domain::descriptor::{ComponentDescriptor, TypeRegistry};
//! # #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
//! # struct ContainerSpec { image: String }
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<ContainerSpec>("Container");
//!
//! let spec = ContainerSpec { image: "nginx".into() };
//! let mut descriptor = ComponentDescriptor::new("Container", "web", &spec, vec![]).unwrap();
//! let decoded = descriptor.decoded_as::<ContainerSpec>(&registry).unwrap().unwrap();
//! assert_eq!(decoded.image, "nginx");
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased decoded component.
pub type DecodedComponent = Arc<dyn Any + Send + Sync>;

/// Decode function registered for one type tag.
pub type DecodeFn = Arc<dyn Fn(&str) -> Result<DecodedComponent, BoxedDecodeError> + Send + Sync>;

/// Error returned by a registered decode function.
pub type BoxedDecodeError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Unknown component type tag: {0}")]
    UnknownTypeTag(String),

    #[error("Malformed payload for component type '{type_tag}': {reason}")]
    MalformedPayload { type_tag: String, reason: String },

    #[error("Component type '{type_tag}' does not decode to {expected}")]
    TypeMismatch {
        type_tag: String,
        expected: &'static str,
    },

    #[error("Failed to encode component '{name}': {reason}")]
    Encode { name: String, reason: String },
}

/// Mapping from type tag to decode function.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a serde-deserializable type under `type_tag`.
    pub fn register<T>(&mut self, type_tag: impl Into<String>) -> &mut Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.with_decoder(type_tag, |payload| {
            let entity: T = serde_json::from_str(payload)?;
            Ok(Arc::new(entity) as DecodedComponent)
        })
    }

    /// Register an arbitrary decode function under `type_tag`.
    pub fn with_decoder<F>(&mut self, type_tag: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(&str) -> Result<DecodedComponent, BoxedDecodeError> + Send + Sync + 'static,
    {
        self.decoders.insert(type_tag.into(), Arc::new(decoder));
        self
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.decoders.contains_key(type_tag)
    }

    pub fn decode(
        &self,
        type_tag: &str,
        payload: &str,
    ) -> Result<DecodedComponent, DescriptorError> {
        let decoder = self
            .decoders
            .get(type_tag)
            .ok_or_else(|| DescriptorError::UnknownTypeTag(type_tag.to_string()))?;

        decoder(payload).map_err(|e| DescriptorError::MalformedPayload {
            type_tag: type_tag.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&String> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("TypeRegistry").field("tags", &tags).finish()
    }
}

/// Name/expression pair used to project values into the payload elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub expression: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    #[serde(rename = "type")]
    pub type_tag: String,

    pub name: String,

    #[serde(default)]
    payload: Option<String>,

    #[serde(default)]
    pub bindings: Vec<Binding>,

    #[serde(skip)]
    decoded: Option<DecodedComponent>,
}

impl ComponentDescriptor {
    pub fn new<T>(
        type_tag: impl Into<String>,
        name: impl Into<String>,
        component: &T,
        bindings: Vec<Binding>,
    ) -> Result<Self, DescriptorError>
    where
        T: Serialize,
    {
        let name = name.into();
        let payload = serde_json::to_string(component).map_err(|e| DescriptorError::Encode {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            type_tag: type_tag.into(),
            name,
            payload: Some(payload),
            bindings,
            decoded: None,
        })
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Replace the serialized payload, dropping any cached decoded form.
    pub fn set_payload(&mut self, payload: Option<String>) {
        self.payload = payload;
        self.decoded = None;
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    /// Decoded component, decoding and caching it on first access.
    ///
    /// Returns `Ok(None)` when the descriptor carries no payload.
    pub fn decode(
        &mut self,
        registry: &TypeRegistry,
    ) -> Result<Option<DecodedComponent>, DescriptorError> {
        let Some(payload) = self.payload.as_deref() else {
            return Ok(None);
        };

        if let Some(decoded) = &self.decoded {
            return Ok(Some(Arc::clone(decoded)));
        }

        let decoded = registry.decode(&self.type_tag, payload)?;
        self.decoded = Some(Arc::clone(&decoded));
        Ok(Some(decoded))
    }

    /// Typed view of [`decode`](Self::decode).
    pub fn decoded_as<T>(
        &mut self,
        registry: &TypeRegistry,
    ) -> Result<Option<Arc<T>>, DescriptorError>
    where
        T: Send + Sync + 'static,
    {
        match self.decode(registry)? {
            None => Ok(None),
            Some(decoded) => decoded
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DescriptorError::TypeMismatch {
                    type_tag: self.type_tag.clone(),
                    expected: std::any::type_name::<T>(),
                }),
        }
    }

    /// Replace the payload with the serialized form of `component` and cache
    /// `component` itself as the decoded form.
    pub fn encode<T>(&mut self, component: Arc<T>) -> Result<(), DescriptorError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let payload =
            serde_json::to_string(component.as_ref()).map_err(|e| DescriptorError::Encode {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        self.payload = Some(payload);
        self.decoded = Some(component as DecodedComponent);
        Ok(())
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("type_tag", &self.type_tag)
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("bindings", &self.bindings)
            .field("decoded", &self.decoded.is_some())
            .finish()
    }
}
