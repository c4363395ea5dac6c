//! Type registry — maps a domain type to its resolver triple.
//!
//! The registry is owned by exactly one [`Store`](crate::client::Store)
//! instance, populated on the builder at construction time and read-only
//! afterward. Lookup failure happens before any backend access.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::resolver::{DeleteResolver, GetResolver, PutResolver};

// ============================================================================
// TypeMapping
// ============================================================================

/// Resolver triple for one domain type.
pub struct TypeMapping<T> {
    pub put: Arc<dyn PutResolver<T>>,
    pub get: Arc<dyn GetResolver<T>>,
    pub delete: Arc<dyn DeleteResolver<T>>,
}

impl<T> TypeMapping<T> {
    pub fn new(
        put: impl PutResolver<T> + 'static,
        get: impl GetResolver<T> + 'static,
        delete: impl DeleteResolver<T> + 'static,
    ) -> Self {
        Self {
            put: Arc::new(put),
            get: Arc::new(get),
            delete: Arc::new(delete),
        }
    }
}

impl<T> std::fmt::Debug for TypeMapping<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMapping").finish_non_exhaustive()
    }
}

impl<T> Clone for TypeMapping<T> {
    fn clone(&self) -> Self {
        Self {
            put: Arc::clone(&self.put),
            get: Arc::clone(&self.get),
            delete: Arc::clone(&self.delete),
        }
    }
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// `TypeId`-keyed map of resolver triples. No reflection: registration is
/// explicit.
#[derive(Default)]
pub struct TypeRegistry {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: 'static>(&mut self, mapping: TypeMapping<T>) {
        self.entries.insert(TypeId::of::<T>(), Box::new(mapping));
    }

    /// Resolver triple for `T`, or a [`ConfigurationError`] naming the
    /// unmapped type. Callers must invoke this before touching the backend.
    pub fn mapping_of<T: 'static>(&self) -> Result<TypeMapping<T>, ConfigurationError> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<TypeMapping<T>>())
            .cloned()
            .ok_or(ConfigurationError {
                type_name: type_name::<T>(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
