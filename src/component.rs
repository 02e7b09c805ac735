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

//! Component and Bundle traits, storage-kind policy, and lifecycle hooks.
//!
//! Components are data attached to entities. Bundles group multiple
//! components for spawning or structural mutation in one transition.

use std::any::TypeId;
use std::collections::HashMap;

use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;
use crate::entity::Entity;
use crate::world::World;

/// Maximum number of components supported by `impl_bundle!`-generated tuples.
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components. Components must be `'static` (no borrowed data).
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Opt-in marker: components implementing this are stored in a per-type
/// sparse set instead of the owning archetype's dense table. Dense storage
/// is the default (`sparse_component::<T>()` returns `false` unless `T`
/// implements this trait).
pub trait SparseStorage: Component {}

/// Storage backend a component's column lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Row-indexed columnar storage inside the archetype's table.
    Table,
    /// Per-entity sparse map; avoids archetype moves on add/remove.
    Sparse,
}

/// Context passed to a component lifecycle hook.
pub struct HookContext {
    pub entity: Entity,
    pub component_id: TypeId,
}

pub type HookFn = fn(&mut World, HookContext);

/// Lifecycle callbacks fired around a component's add/insert/replace/remove/despawn.
#[derive(Default, Clone, Copy)]
pub struct ComponentHooks {
    pub on_add: Option<HookFn>,
    pub on_insert: Option<HookFn>,
    pub on_replace: Option<HookFn>,
    pub on_remove: Option<HookFn>,
    pub on_despawn: Option<HookFn>,
}

/// Per-type metadata registered the first time a component is seen.
#[derive(Clone)]
pub struct ComponentInfo {
    pub type_id: TypeId,
    pub name: &'static str,
    pub storage: StorageKind,
    pub size: usize,
    pub align: usize,
    pub needs_drop: bool,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    pub hooks: ComponentHooks,
    /// Map from required-component type id to its minimal depth from this type.
    pub required: HashMap<TypeId, u32>,
    /// Type-erased default constructor, present when this type was registered
    /// as a required component of some other type. Writes a default-valued
    /// instance to an uninitialized, correctly-sized and aligned pointer.
    pub default_ctor: Option<unsafe fn(*mut u8)>,
}

/// Registry of `ComponentInfo`, keyed by `TypeId`, with idempotent registration.
#[derive(Default)]
pub struct Components {
    infos: HashMap<TypeId, ComponentInfo>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`'s metadata if not already present; returns a reference either way.
    pub fn register_info<T: Component>(&mut self) -> &ComponentInfo {
        let type_id = TypeId::of::<T>();
        self.infos.entry(type_id).or_insert_with(|| ComponentInfo {
            type_id,
            name: std::any::type_name::<T>(),
            storage: StorageKind::Table,
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            needs_drop: std::mem::needs_drop::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
            hooks: ComponentHooks::default(),
            required: HashMap::new(),
            default_ctor: None,
        })
    }

    /// Mark a previously-registered (or not-yet-registered) type as sparse.
    pub fn mark_sparse<T: Component>(&mut self) {
        self.register_info::<T>();
        self.infos.get_mut(&TypeId::of::<T>()).unwrap().storage = StorageKind::Sparse;
    }

    /// Install hooks for `T`, registering its metadata first if needed.
    pub fn set_hooks<T: Component>(&mut self, hooks: ComponentHooks) {
        self.register_info::<T>();
        self.infos.get_mut(&TypeId::of::<T>()).unwrap().hooks = hooks;
    }

    /// Declare that `T` requires `R` to be present at depth `depth`; the
    /// shallowest depth for a given required component wins if declared
    /// along multiple paths. `R` must implement `Default` so the bundle
    /// insert engine can materialize it when it is missing.
    pub fn add_required<T: Component, R: Component + Default>(&mut self, depth: u32) {
        self.register_info::<T>();
        self.register_info::<R>();

        let r_info = self.infos.get_mut(&TypeId::of::<R>()).unwrap();
        if r_info.default_ctor.is_none() {
            r_info.default_ctor = Some(|ptr| unsafe { std::ptr::write(ptr as *mut R, R::default()) });
        }

        let entry = self.infos.get_mut(&TypeId::of::<T>()).unwrap().required.entry(TypeId::of::<R>()).or_insert(depth);
        if depth < *entry {
            *entry = depth;
        }
    }

    pub fn get(&self, type_id: TypeId) -> Option<&ComponentInfo> {
        self.infos.get(&type_id)
    }

    pub fn storage_kind(&self, type_id: TypeId) -> StorageKind {
        self.infos.get(&type_id).map(|i| i.storage).unwrap_or(StorageKind::Table)
    }
}

/// Bundle of components: allows spawning or structurally mutating an entity
/// with several components in one transition.
pub trait Bundle: Send + Sync + 'static {
    /// Type ids of all components in the bundle, in declared order.
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Ensure component columns exist in an archetype's table for the dense
    /// members of this bundle (sparse members are handled separately by the
    /// bundle insert engine).
    fn register_components(archetype: &mut Archetype)
    where
        Self: Sized;

    /// Write components to raw pointers, one per type id in declared order.
    ///
    /// # Safety
    /// Caller must ensure pointers are valid, properly aligned, and sized
    /// for each corresponding component type.
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

// DO NOT implement Bundle for T: Component directly - it would conflict
// with the tuple implementations below.

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn register_components(archetype: &mut Archetype) {
                $(archetype.register_component::<$T>();)*
            }

            #[allow(non_snake_case)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    i += 1;
                )*
                let _ = i;
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[test]
    fn test_single_component() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            x: f32,
            y: f32,
        }

        let type_ids = <(Position,)>::type_ids();
        assert_eq!(type_ids.len(), 1);
        assert_eq!(type_ids[0], TypeId::of::<Position>());
    }

    #[test]
    fn test_multiple_components() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            x: f32,
        }
        #[derive(Debug, Clone, Copy)]
        struct Velocity {
            x: f32,
        }

        let type_ids = <(Position, Velocity)>::type_ids();
        assert_eq!(type_ids.len(), 2);
    }

    #[test]
    fn register_info_is_idempotent() {
        struct Marker(u32);
        let mut components = Components::new();
        let size_a = components.register_info::<Marker>().size;
        let size_b = components.register_info::<Marker>().size;
        assert_eq!(size_a, size_b);
        assert_eq!(components.storage_kind(TypeId::of::<Marker>()), StorageKind::Table);
    }

    #[test]
    fn mark_sparse_changes_storage_kind() {
        struct Rare;
        let mut components = Components::new();
        components.mark_sparse::<Rare>();
        assert_eq!(components.storage_kind(TypeId::of::<Rare>()), StorageKind::Sparse);
    }

    #[test]
    fn required_components_take_shallowest_depth() {
        struct A;
        #[derive(Default)]
        struct B;
        let mut components = Components::new();
        components.add_required::<A, B>(2);
        components.add_required::<A, B>(1);
        let info = components.get(TypeId::of::<A>()).unwrap();
        assert_eq!(info.required[&TypeId::of::<B>()], 1);
    }

    #[test]
    fn required_component_gets_a_default_ctor() {
        struct A;
        #[derive(Default, PartialEq, Debug)]
        struct B(u32);
        let mut components = Components::new();
        components.add_required::<A, B>(1);

        let ctor = components.get(TypeId::of::<B>()).unwrap().default_ctor.unwrap();
        let mut slot = std::mem::MaybeUninit::<B>::uninit();
        unsafe {
            ctor(slot.as_mut_ptr() as *mut u8);
            assert_eq!(slot.assume_init(), B(0));
        }
    }
}
