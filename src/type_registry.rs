// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide stable type ids.
//!
//! `std::any::TypeId` is already stable and thread-safe, but it is an opaque
//! 128-bit hash with no room for a `TypeInfo` side-table. This registry
//! layers a dense `u32` id plus metadata (size, align, name, drop thunk) on
//! top, assigned on first use under a mutex; reads after publication never
//! take the lock.

use std::any::{type_name, TypeId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use rustc_hash::FxHashMap;

/// Dense, process-stable id for a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub size: usize,
    pub align: usize,
    pub name: &'static str,
    pub needs_drop: bool,
}

struct RegistryInner {
    by_type: FxHashMap<TypeId, ComponentId>,
    info: Vec<TypeInfo>,
}

/// Thread-safe first-use type registry.
///
/// The `RwLock` is only ever write-locked on first registration of a given
/// `TypeId`; every subsequent lookup takes a read lock, which under
/// `parking_lot` degrades to an uncontended atomic in the common case.
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
    next_id: AtomicU32,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner { by_type: FxHashMap::default(), info: Vec::new() }),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register `T`, if not already registered, and return its stable id.
    pub fn register<T: 'static>(&self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        {
            let guard = self.inner.read().unwrap();
            if let Some(&id) = guard.by_type.get(&type_id) {
                return id;
            }
        }

        let mut guard = self.inner.write().unwrap();
        // Re-check: another thread may have registered T while we waited for the write lock.
        if let Some(&id) = guard.by_type.get(&type_id) {
            return id;
        }
        let id = ComponentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        guard.info.push(TypeInfo {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            name: type_name::<T>(),
            needs_drop: std::mem::needs_drop::<T>(),
        });
        guard.by_type.insert(type_id, id);
        id
    }

    pub fn type_info(&self, id: ComponentId) -> Option<TypeInfo> {
        self.inner.read().unwrap().info.get(id.0 as usize).copied()
    }

    pub fn id_of(&self, type_id: TypeId) -> Option<ComponentId> {
        self.inner.read().unwrap().by_type.get(&type_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_same_id() {
        let registry = TypeRegistry::new();
        let a = registry.register::<u32>();
        let b = registry.register::<u32>();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_types_distinct_ids() {
        let registry = TypeRegistry::new();
        let a = registry.register::<u32>();
        let b = registry.register::<f64>();
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_first_use_agrees() {
        use std::sync::Arc;
        use std::thread;

        struct Marker;

        let registry = Arc::new(TypeRegistry::new());
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register::<Marker>())
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let info = registry.type_info(ids[0]).unwrap();
        assert_eq!(info.size, std::mem::size_of::<Marker>());
    }
}
