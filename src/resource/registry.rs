//! Runtime-built type registry.
//!
//! Mirrored kinds are only known once their definitions have been
//! discovered, so instances travel as [`DynamicObject`]s and the registry
//! supplies the [`ApiResource`] each kind needs to be addressed on the wire.

use crate::crd::ResourceTypeDescriptor;
use crate::error::{MirrorError, Result};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use std::collections::HashMap;

/// A kind known to the registry.
#[derive(Debug, Clone)]
pub struct RegisteredType {
    pub resource: ApiResource,
    pub list_kind: String,
    pub namespaced: bool,
}

/// Maps (group, version, kind) to the dynamic type used to encode and
/// decode instances of that kind.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<GroupVersionKind, RegisteredType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: &[ResourceTypeDescriptor]) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: &ResourceTypeDescriptor) {
        let gvk = descriptor.gvk();
        let resource = ApiResource::from_gvk_with_plural(&gvk, &descriptor.plural);
        self.types.insert(
            gvk,
            RegisteredType {
                resource,
                list_kind: descriptor.list_kind.clone(),
                namespaced: descriptor.namespaced,
            },
        );
    }

    pub fn resolve(&self, gvk: &GroupVersionKind) -> Result<&RegisteredType> {
        self.types.get(gvk).ok_or_else(|| {
            MirrorError::UnknownType(format!("{}/{} {}", gvk.group, gvk.version, gvk.kind))
        })
    }

    /// Resolve the type an instance declares through its apiVersion/kind.
    pub fn resolve_object(&self, obj: &DynamicObject) -> Result<&RegisteredType> {
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| MirrorError::Serialization("object has no apiVersion/kind".into()))?;
        let gvk = GroupVersionKind::try_from(types)
            .map_err(|e| MirrorError::Serialization(e.to_string()))?;
        self.resolve(&gvk)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
