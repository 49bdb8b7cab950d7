//! Descriptor registry.
//!
//! Descriptors are built lazily on first use and cached per entity type.
//! Building a descriptor is pure, so a race between two first users may build
//! twice; the first writer wins and both see equivalent mappings. Entries are
//! never replaced or evicted.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::mapping::EntityDescriptor;

/// A persistable or queryable type with a static table mapping.
pub trait Entity: Send + Sized + 'static {
    /// Build this type's descriptor. Called at most a handful of times per
    /// process; the registry caches the result.
    fn descriptor() -> EntityDescriptor<Self>;
}

/// Process-wide cache of entity descriptors, keyed by type.
#[derive(Default)]
pub struct DescriptorRegistry {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached descriptor for `T`, building it on first access.
    ///
    /// The build runs outside any lock. A concurrent first access may build
    /// redundantly; the stored entry is whichever build won the write race.
    pub fn descriptor_for<T: Entity>(&self) -> Arc<EntityDescriptor<T>> {
        let key = TypeId::of::<T>();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = entries.get(&key) {
                if let Ok(descriptor) = Arc::clone(existing).downcast::<EntityDescriptor<T>>() {
                    return descriptor;
                }
            }
        }

        let built = Arc::new(T::descriptor());

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let stored = entries.entry(key).or_insert_with(|| {
            debug!(entity = built.name(), "descriptor registered");
            Arc::clone(&built) as Arc<dyn Any + Send + Sync>
        });
        // The key is the TypeId of T, so the stored entry is always an
        // EntityDescriptor<T>; the fallback never runs.
        Arc::clone(stored)
            .downcast::<EntityDescriptor<T>>()
            .unwrap_or(built)
    }

    /// Number of registered descriptors, for diagnostics.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
