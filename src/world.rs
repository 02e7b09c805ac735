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

//! World: central entity and archetype storage.

use ahash::AHashMap;
use std::any::TypeId;
use std::cell::RefCell;
use std::ptr::NonNull;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeSignature, BundleId};
use crate::command::CommandBuffer;
use crate::component::{Bundle, Component, ComponentHooks, Components, HookContext, MAX_BUNDLE_COMPONENTS};
use crate::entity::{Entities, Entity, EntityLocation};
use crate::error::{EcsError, Result};
use crate::query::{Query, QueryFetch, QueryFetchMut, QueryFilter, QueryMut};

/// Key a single-component structural transition into the archetype edge
/// cache. `add_component`/`remove_component` only ever move an entity by one
/// component at a time, so the type id alone is enough to identify the edge.
fn component_bundle_id(type_id: TypeId) -> BundleId {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    type_id.hash(&mut hasher);
    BundleId(hasher.finish())
}

/// Central ECS world.
///
/// Holds all entities, component storage (archetypes), typed resources, and
/// the per-type component metadata registry.
pub struct World {
    entities: Entities,
    archetypes: Vec<Archetype>,
    archetype_index: AHashMap<ArchetypeSignature, usize>,
    components: Components,

    tick: u32,
    removal_queue: Vec<Entity>,
    resources: AHashMap<TypeId, Box<dyn std::any::Any + Send + Sync>>,
    query_cache: RefCell<AHashMap<crate::query::QuerySignature, crate::query::CachedQueryResult>>,

    /// Commands queued by systems through the `Commands` system param. Mutex-
    /// guarded (not per-system `Local` state) so any number of systems can
    /// queue commands even when the scheduler runs them concurrently; they're
    /// drained and applied once per frame after every system has returned.
    pending_commands: parking_lot::Mutex<CommandBuffer>,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        let mut world = Self {
            entities: Entities::new(),
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),
            components: Components::new(),

            // Tick 0 is reserved so change-detection comparisons against a
            // freshly-added component's tick always read as "newer".
            tick: 1,
            removal_queue: Vec::new(),
            resources: AHashMap::new(),
            query_cache: RefCell::new(AHashMap::with_capacity(32)),
            pending_commands: parking_lot::Mutex::new(CommandBuffer::new()),
        };

        world.get_or_create_archetype_with(&ArchetypeSignature::new(), |_| {});
        world
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Alias of `tick`, named for parity with query state's "last seen" tick.
    pub fn change_tick(&self) -> u32 {
        self.tick
    }

    /// Advance the world tick, wrapping rather than panicking: change
    /// detection compares ticks with `archetype::tick_newer_than`, which is
    /// correct across a wraparound.
    pub fn increment_change_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut Components {
        &mut self.components
    }

    /// Register lifecycle hooks for `T`.
    pub fn set_component_hooks<T: Component>(&mut self, hooks: ComponentHooks) {
        self.components.set_hooks::<T>(hooks);
    }

    /// Declare that `T` requires `R`, auto-inserted (via `R::default()`)
    /// whenever `T` is inserted on an entity that doesn't already have `R`.
    pub fn register_required_component<T: Component, R: Component + Default>(&mut self, depth: u32) {
        self.components.add_required::<T, R>(depth);
    }

    fn fire_hook(&mut self, hook: Option<crate::component::HookFn>, entity: Entity, component_id: TypeId) {
        if let Some(hook) = hook {
            hook(self, HookContext { entity, component_id });
        }
    }

    /// Spawn a new entity with the given bundle of components.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        let type_ids = B::type_ids();
        #[cfg(feature = "profiling")]
        let span = info_span!("world.spawn", bundle_components = type_ids.len(), archetype_count = self.archetypes.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let arch_id = self.get_or_create_archetype_with(&type_ids, |archetype| {
            B::register_components(archetype);
        });

        let entity = self.entities.alloc();
        let archetype = &mut self.archetypes[arch_id];
        let row = archetype.allocate_row(entity);
        self.entities.set(entity.index, EntityLocation { archetype_id: arch_id as u32, archetype_row: row as u32, table_id: arch_id as u32, table_row: row as u32 });

        let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
        for (i, &type_id) in type_ids.iter().enumerate() {
            if let Some(column) = archetype.get_column_mut(type_id) {
                let ptr = column.get_ptr_mut(row);
                column.set_added(row, self.tick);
                ptrs[i] = ptr;
            }
        }
        unsafe {
            bundle.write_components(&ptrs[..type_ids.len()]);
        }

        for &type_id in &type_ids {
            if let Some(info) = self.components.get(type_id) {
                self.fire_hook(info.hooks.on_add, entity, type_id);
                self.fire_hook(info.hooks.on_insert, entity, type_id);
            }
        }

        self.insert_required_components(entity, &type_ids);
        entity
    }

    /// True if the entity handle is valid and the entity exists in the world.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Queue an entity for removal, processed by `flush_removals`.
    pub fn despawn_deferred(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.contains(entity) {
            return Err(EcsError::EntityNotFound);
        }
        self.removal_queue.push(entity);
        Ok(())
    }

    /// Remove the entity and all its components immediately.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.contains(entity) {
            return Err(EcsError::EntityNotFound);
        }

        let location = self.entities.get(entity).unwrap();
        let signature = self.archetypes[location.archetype_id as usize].signature().clone();
        for type_id in signature {
            if let Some(info) = self.components.get(type_id) {
                self.fire_hook(info.hooks.on_remove, entity, type_id);
                self.fire_hook(info.hooks.on_despawn, entity, type_id);
            }
        }

        let location = self.entities.free(entity).unwrap();
        let archetype = &mut self.archetypes[location.archetype_id as usize];
        unsafe {
            if let Some(swapped_entity) = archetype.remove_row(location.archetype_row as usize) {
                if let Some(mut swapped_loc) = self.entities.get(swapped_entity) {
                    swapped_loc.archetype_row = location.archetype_row;
                    swapped_loc.table_row = location.archetype_row;
                    self.entities.set(swapped_entity.index, swapped_loc);
                }
            }
        }
        Ok(())
    }

    /// Reserve a new entity id without any locking; safe to call from any
    /// number of systems holding only a shared `&World` (e.g. through
    /// `Commands`) while others run concurrently. The id is valid and
    /// `is_alive` immediately, but has no archetype location (and is
    /// invisible to queries) until the next `flush`.
    pub fn reserve_entity(&self) -> Entity {
        self.entities.reserve_entity()
    }

    /// Reserve `count` entity ids without any locking.
    pub fn reserve_entities(&self, count: u32) -> Vec<Entity> {
        self.entities.reserve_entities(count)
    }

    /// Materialize every entity reserved (but not yet allocated) via
    /// `reserve_entity`/`reserve_entities`, giving each a location in the
    /// root (zero-component) archetype. Must run before any queued command
    /// that references a freshly-reserved entity is applied.
    pub fn flush_entities(&mut self) {
        let root_archetype_id = *self.archetype_index.get(&ArchetypeSignature::new()).expect("root archetype always exists");
        let Self { entities, archetypes, .. } = self;
        entities.flush(|entity, loc| {
            let archetype = &mut archetypes[root_archetype_id];
            let row = archetype.allocate_row(entity);
            *loc = EntityLocation { archetype_id: root_archetype_id as u32, archetype_row: row as u32, table_id: root_archetype_id as u32, table_row: row as u32 };
        });
    }

    /// Materialize reserved entities, then drain and apply every command
    /// queued this frame. The frame barrier between the concurrent dispatch
    /// phase and the next frame's systems.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_entities();
        let buffer = self.take_queued_commands();
        self.flush_commands(buffer)
    }

    /// Write `bundle` onto an already-reserved (and flushed) entity, moving
    /// it out of the root archetype into the bundle's archetype. Used by
    /// `Commands::spawn_bundle` to apply a deferred spawn against an entity
    /// id that was handed back to the caller before the frame barrier.
    pub fn insert_bundle_into_reserved<B: Bundle>(&mut self, entity: Entity, bundle: B) -> Result<()> {
        let location = self.entities.get(entity).ok_or(EcsError::EntityNotFound)?;
        let type_ids = B::type_ids();

        let new_archetype_id = self.get_or_create_archetype_with(&type_ids, |archetype| {
            B::register_components(archetype);
        });

        let tick = self.tick;
        let inner_type_ids = type_ids.clone();
        self.move_entity(entity, location, new_archetype_id, move |archetype, row| {
            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (i, &type_id) in inner_type_ids.iter().enumerate() {
                if let Some(column) = archetype.get_column_mut(type_id) {
                    let ptr = column.get_ptr_mut(row);
                    column.set_added(row, tick);
                    ptrs[i] = ptr;
                }
            }
            unsafe {
                bundle.write_components(&ptrs[..inner_type_ids.len()]);
            }
        })?;

        for &type_id in &type_ids {
            if let Some(info) = self.components.get(type_id) {
                self.fire_hook(info.hooks.on_add, entity, type_id);
                self.fire_hook(info.hooks.on_insert, entity, type_id);
            }
        }
        self.insert_required_components(entity, &type_ids);
        Ok(())
    }

    /// Process all entities queued by `despawn_deferred`.
    pub fn flush_removals(&mut self) -> Result<()> {
        let to_remove: Vec<_> = self.removal_queue.drain(..).collect();
        for entity in to_remove {
            if self.entities.contains(entity) {
                self.despawn(entity)?;
            }
        }
        Ok(())
    }

    pub fn get_entity_location(&self, entity: Entity) -> Option<EntityLocation> {
        self.entities.get(entity)
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let location = self.entities.get(entity)?;
        let archetype = self.archetypes.get(location.archetype_id as usize)?;
        let column = archetype.get_column(TypeId::of::<T>())?;
        column.get::<T>(location.archetype_row as usize)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let location = self.entities.get(entity)?;
        let tick = self.tick;
        let archetype = self.archetypes.get_mut(location.archetype_id as usize)?;
        let column = archetype.get_column_mut(TypeId::of::<T>())?;
        column.set_changed(location.archetype_row as usize, tick);
        column.get_mut::<T>(location.archetype_row as usize)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.entities
            .get(entity)
            .and_then(|loc| self.archetypes.get(loc.archetype_id as usize))
            .map(|arch| arch.has_column(TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Add a component to an entity, moving it to a new archetype unless the
    /// component is already present (in which case it is overwritten in place).
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        let location = self.entities.get(entity).ok_or(EcsError::EntityNotFound)?;
        let old_archetype = &mut self.archetypes[location.archetype_id as usize];

        if let Some(col) = old_archetype.get_column_mut(TypeId::of::<T>()) {
            let ptr = col.get_ptr_mut(location.archetype_row as usize) as *mut T;
            unsafe {
                std::ptr::write(ptr, component);
            }
            col.set_changed(location.archetype_row as usize, self.tick);
            if let Some(info) = self.components.get(TypeId::of::<T>()) {
                self.fire_hook(info.hooks.on_replace, entity, TypeId::of::<T>());
                self.fire_hook(info.hooks.on_insert, entity, TypeId::of::<T>());
            }
            return Ok(());
        }

        let type_id = TypeId::of::<T>();
        let bundle_id = component_bundle_id(type_id);
        let cached_target = old_archetype.edges.get_add(bundle_id);

        let new_archetype_id = if let Some(target) = cached_target {
            target as usize
        } else {
            let mut new_signature = old_archetype.signature().clone();
            new_signature.push(type_id);
            new_signature.sort();

            let empty_clone = old_archetype.clone_empty();

            let new_id = self.get_or_create_archetype_with(&new_signature, move |archetype| {
                *archetype = empty_clone;
                archetype.register_component::<T>();
            });

            self.archetypes[location.archetype_id as usize].edges.set_add(bundle_id, new_id as u32);
            new_id
        };

        let tick = self.tick;
        self.move_entity(entity, location, new_archetype_id, move |archetype, row| {
            if let Some(col) = archetype.get_column_mut(TypeId::of::<T>()) {
                let ptr = col.get_ptr_mut(row) as *mut T;
                unsafe {
                    std::ptr::write(ptr, component);
                }
                col.set_added(row, tick);
            }
        })?;

        self.components.register_info::<T>();
        if let Some(info) = self.components.get(TypeId::of::<T>()) {
            self.fire_hook(info.hooks.on_add, entity, TypeId::of::<T>());
            self.fire_hook(info.hooks.on_insert, entity, TypeId::of::<T>());
        }
        self.insert_required_components(entity, &[TypeId::of::<T>()]);
        Ok(())
    }

    /// True if `entity`'s current archetype has a column for `type_id`.
    fn entity_has_component_type(&self, entity: Entity, type_id: TypeId) -> bool {
        self.entities
            .get(entity)
            .and_then(|loc| self.archetypes.get(loc.archetype_id as usize))
            .map(|arch| arch.has_column(type_id))
            .unwrap_or(false)
    }

    /// Walk `seed_type_ids`' declared required components (and, transitively,
    /// theirs) and insert a default-constructed value for any that `entity`
    /// doesn't already carry. Required components with no registered default
    /// constructor are silently skipped.
    fn insert_required_components(&mut self, entity: Entity, seed_type_ids: &[TypeId]) {
        let mut queue: Vec<TypeId> = seed_type_ids.to_vec();
        let mut seen: std::collections::HashSet<TypeId> = seed_type_ids.iter().copied().collect();

        while let Some(type_id) = queue.pop() {
            let Some(info) = self.components.get(type_id) else { continue };
            let mut required: Vec<TypeId> = info.required.keys().copied().collect();
            required.sort_by_key(|r| info.required[r]);

            for required_id in required {
                if !seen.insert(required_id) {
                    continue;
                }
                if self.entity_has_component_type(entity, required_id) {
                    continue;
                }
                if self.insert_required_component_default(entity, required_id) {
                    queue.push(required_id);
                }
            }
        }
    }

    /// Insert a default-constructed `type_id` onto `entity`'s archetype.
    /// Returns `false` (no-op) if `type_id` has no registered default
    /// constructor or is already present.
    fn insert_required_component_default(&mut self, entity: Entity, type_id: TypeId) -> bool {
        let Some(info) = self.components.get(type_id).cloned() else { return false };
        let Some(default_ctor) = info.default_ctor else { return false };
        let Some(location) = self.entities.get(entity) else { return false };

        let old_archetype = &self.archetypes[location.archetype_id as usize];
        if old_archetype.has_column(type_id) {
            return false;
        }

        let mut new_signature = old_archetype.signature().clone();
        new_signature.push(type_id);
        new_signature.sort();

        let new_archetype_id = self.get_or_create_archetype_with(&new_signature, |archetype| {
            for &existing_id in &new_signature {
                if let Some(existing_info) = self.components.get(existing_id) {
                    archetype.add_column_raw(existing_id, existing_info.size, existing_info.drop_fn, existing_info.storage);
                }
            }
        });

        let tick = self.tick;
        let moved = self.move_entity(entity, location, new_archetype_id, move |archetype, row| {
            if let Some(col) = archetype.get_column_mut(type_id) {
                let ptr = col.get_ptr_mut(row);
                unsafe {
                    default_ctor(ptr);
                }
                col.set_added(row, tick);
            }
        });
        if moved.is_err() {
            return false;
        }

        self.fire_hook(info.hooks.on_add, entity, type_id);
        self.fire_hook(info.hooks.on_insert, entity, type_id);
        true
    }

    /// Remove a component from an entity, moving it to a new archetype.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<()> {
        let old_location = self.entities.get(entity).ok_or(EcsError::EntityNotFound)?;
        let component_type_id = TypeId::of::<T>();

        if !self.archetypes[old_location.archetype_id as usize].has_column(component_type_id) {
            return Err(EcsError::ComponentNotFound);
        }

        if let Some(info) = self.components.get(component_type_id) {
            self.fire_hook(info.hooks.on_remove, entity, component_type_id);
        }

        let bundle_id = component_bundle_id(component_type_id);
        let old_archetype = &self.archetypes[old_location.archetype_id as usize];
        let cached_target = old_archetype.edges.get_remove(bundle_id);

        let new_archetype_id = if let Some(target) = cached_target {
            target as usize
        } else {
            let mut new_signature = old_archetype.signature().clone();
            new_signature.retain(|tid| *tid != component_type_id);

            let new_id = self.get_or_create_archetype_with(&new_signature, |archetype| {
                for &type_id in &new_signature {
                    if let Some(info) = self.components.get(type_id) {
                        archetype.add_column_raw(type_id, info.size, info.drop_fn, info.storage);
                    }
                }
            });

            self.archetypes[old_location.archetype_id as usize].edges.set_remove(bundle_id, new_id as u32);
            new_id
        };

        self.move_entity(entity, old_location, new_archetype_id, |_, _| {})
    }

    /// Fetch typed data for a single entity via a `QueryFetch` impl.
    pub fn get_components<'a, Q>(&'a self, entity: Entity) -> Option<<Q as QueryFetch<'a>>::Item>
    where
        Q: QueryFetch<'a>,
    {
        let location = self.entities.get(entity)?;
        let archetype = self.archetypes.get(location.archetype_id as usize)?;
        let state = Q::prepare(archetype, 0)?;
        unsafe { Q::fetch(&state, location.archetype_row as usize) }
    }

    /// Fetch typed mutable data for a single entity via a `QueryFetchMut` impl.
    pub fn get_components_mut<'a, Q>(&'a mut self, entity: Entity) -> Option<<Q as QueryFetchMut<'a>>::Item>
    where
        Q: QueryFetchMut<'a>,
    {
        let location = self.entities.get(entity)?;
        let tick = self.tick;
        let archetype = self.archetypes.get_mut(location.archetype_id as usize)?;
        let mut state = Q::prepare(archetype, 0, tick)?;
        unsafe { Q::fetch(&mut state, location.archetype_row as usize) }
    }

    pub fn query_mut<'w, Q>(&'w mut self) -> QueryMut<'w, Q>
    where
        Q: QueryFilter + QueryFetchMut<'w>,
    {
        QueryMut::new(self)
    }

    pub fn query<'w, Q>(&'w self) -> Query<'w, Q>
    where
        Q: QueryFilter + QueryFetch<'w>,
    {
        Query::new(self)
    }

    fn move_entity<F>(&mut self, entity: Entity, old_loc: EntityLocation, new_archetype_id: usize, on_new_location: F) -> Result<()>
    where
        F: FnOnce(&mut Archetype, usize),
    {
        if old_loc.archetype_id as usize == new_archetype_id {
            return Ok(());
        }

        let old_id = old_loc.archetype_id as usize;
        let (old_arch, new_arch) = if old_id < new_archetype_id {
            let (left, right) = self.archetypes.split_at_mut(new_archetype_id);
            (&mut left[old_id], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(old_id);
            (&mut right[0], &mut left[new_archetype_id])
        };

        let new_row = new_arch.allocate_row(entity);

        unsafe {
            let new_sig = new_arch.signature().clone();
            for type_id in new_sig {
                if let Some(old_col) = old_arch.get_column_mut(type_id) {
                    if let Some(new_col) = new_arch.get_column_mut(type_id) {
                        let src = old_col.get_ptr_mut(old_loc.archetype_row as usize);
                        let dst = new_col.get_ptr_mut(new_row);
                        std::ptr::copy_nonoverlapping(src, dst, old_col.get_item_size());
                        new_col.set_changed(new_row, old_col.changed_tick(old_loc.archetype_row as usize));
                    }
                }
            }
        }

        on_new_location(new_arch, new_row);

        unsafe {
            if let Some(swapped_entity) = old_arch.remove_row(old_loc.archetype_row as usize) {
                if let Some(mut swapped_loc) = self.entities.get(swapped_entity) {
                    swapped_loc.archetype_row = old_loc.archetype_row;
                    swapped_loc.table_row = old_loc.archetype_row;
                    self.entities.set(swapped_entity.index, swapped_loc);
                }
            }
        }

        self.entities.set(
            entity.index,
            EntityLocation { archetype_id: new_archetype_id as u32, archetype_row: new_row as u32, table_id: new_archetype_id as u32, table_row: new_row as u32 },
        );

        Ok(())
    }

    pub(crate) fn get_cached_query_indices<Q: QueryFilter>(&self) -> Vec<usize> {
        let sig = Q::signature();

        {
            let mut cache = self.query_cache.borrow_mut();
            if let Some(cached) = cache.get_mut(&sig) {
                cached.update(&self.archetypes);
                return cached.matches.to_vec();
            }
        }

        let cached = crate::query::CachedQueryResult::new(sig.clone(), &self.archetypes);
        let indices = cached.matches.to_vec();
        self.query_cache.borrow_mut().insert(sig, cached);
        indices
    }

    pub fn entity_exists(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    pub fn get_archetype(&self, id: usize) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    pub fn get_archetype_mut(&mut self, id: usize) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetype_ptr(&self, id: usize) -> Option<NonNull<Archetype>> {
        self.archetypes.get(id).map(NonNull::from)
    }

    /// # Safety
    /// Returned pointer is valid for the lifetime of the world; the caller
    /// must not alias it across concurrent mutable access.
    pub(crate) fn archetype_ptr_mut(&mut self, id: usize) -> Option<NonNull<Archetype>> {
        self.archetypes.get_mut(id).map(NonNull::from)
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.size()
    }

    pub fn flush_commands(&mut self, buffer: CommandBuffer) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.flush_commands", queued = buffer.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        buffer.apply(self)
    }

    /// Lock the shared per-frame command buffer. Safe to call while other
    /// systems hold their own `&mut World` borrow concurrently, since only
    /// the mutex-guarded buffer itself is touched.
    pub(crate) fn pending_commands(&self) -> parking_lot::MutexGuard<'_, CommandBuffer> {
        self.pending_commands.lock()
    }

    /// Drain and return every command queued since the last drain.
    pub fn take_queued_commands(&mut self) -> CommandBuffer {
        std::mem::take(&mut *self.pending_commands.lock())
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.archetypes.clear();
        self.archetype_index.clear();
        self.query_cache.borrow_mut().clear();
        self.get_or_create_archetype_with(&ArchetypeSignature::new(), |_| {});
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let archetype_memory: usize = self.archetypes.iter().map(|_| std::mem::size_of::<Archetype>()).sum();
        let entity_index_memory = self.entities.total_count() * std::mem::size_of::<EntityLocation>();

        MemoryStats { entity_index_memory, archetype_memory, total_memory: archetype_memory + entity_index_memory }
    }

    // ========== Resource API ==========

    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.resources.insert(TypeId::of::<R>(), Box::new(resource));
    }

    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources.get(&TypeId::of::<R>()).and_then(|r| r.downcast_ref())
    }

    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut(&TypeId::of::<R>()).and_then(|r| r.downcast_mut())
    }

    pub fn has_resource<R: 'static>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<R>())
    }

    pub fn remove_resource<R: 'static>(&mut self) -> Option<R> {
        self.resources.remove(&TypeId::of::<R>()).and_then(|r| r.downcast().ok()).map(|boxed| *boxed)
    }

    /// Get or create the archetype for `signature`, creating it (canonically
    /// sorted) via `on_create` if it does not already exist.
    fn get_or_create_archetype_with<F>(&mut self, signature: &ArchetypeSignature, on_create: F) -> usize
    where
        F: FnOnce(&mut Archetype),
    {
        if self.archetypes.len() >= 10_000 {
            panic!("Archetype limit exceeded (10,000) - possible archetype explosion");
        }

        let mut sorted_signature = signature.clone();
        sorted_signature.sort();

        if let Some(&id) = self.archetype_index.get(&sorted_signature) {
            return id;
        }

        let mut archetype = Archetype::new(sorted_signature.clone());
        on_create(&mut archetype);

        self.archetypes.push(archetype);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(sorted_signature, id);
        id
    }

    /// Spawn multiple entities sharing one bundle type in a single archetype pass.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<Entity>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
        I::IntoIter: ExactSizeIterator,
    {
        let bundles = bundles.into_iter();
        let count = bundles.len();

        if count > 10_000_000 {
            return Err(EcsError::BatchTooLarge);
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        self.entities.reserve(count as u32);

        let type_ids = B::type_ids();
        let archetype_id = self.get_or_create_archetype_with(&type_ids, |archetype| {
            B::register_components(archetype);
        });

        let archetype = &mut self.archetypes[archetype_id];
        archetype.reserve_rows(count);
        let mut entity_ids = Vec::with_capacity(count);

        for bundle in bundles {
            let entity = self.entities.alloc();
            let row = archetype.allocate_row(entity);
            self.entities.set(
                entity.index,
                EntityLocation { archetype_id: archetype_id as u32, archetype_row: row as u32, table_id: archetype_id as u32, table_row: row as u32 },
            );

            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (i, &type_id) in type_ids.iter().enumerate() {
                if let Some(column) = archetype.get_column_mut(type_id) {
                    let ptr = column.get_ptr_mut(row);
                    column.set_added(row, self.tick);
                    ptrs[i] = ptr;
                }
            }
            unsafe {
                bundle.write_components(&ptrs[..type_ids.len()]);
            }

            entity_ids.push(entity);
        }

        Ok(entity_ids)
    }

    pub fn get_cached_query_indices_by_sig(&self, signature: &crate::query::QuerySignature) -> Vec<usize> {
        let current_archetype_count = self.archetypes.len();
        let mut cache = self.query_cache.borrow_mut();

        if let Some(cached) = cache.get_mut(signature) {
            if cached.seen_archetypes < current_archetype_count {
                cached.update(&self.archetypes);
            }
            cached.matches.to_vec()
        } else {
            let cached = crate::query::CachedQueryResult::new(signature.clone(), &self.archetypes);
            let indices = cached.matches.to_vec();
            cache.insert(signature.clone(), cached);
            indices
        }
    }

    pub fn clear_query_cache(&self) {
        self.query_cache.borrow_mut().clear();
    }

    pub fn query_cache_stats(&self) -> QueryCacheStats {
        let cache = self.query_cache.borrow();
        let total_cached_archetypes: usize = cache.values().map(|cached| cached.matches.len()).sum();

        QueryCacheStats { num_cached_queries: cache.len(), total_cached_archetypes, total_archetypes: self.archetypes.len() }
    }
}

/// Statistics about the query cache.
#[derive(Debug, Clone, Copy)]
pub struct QueryCacheStats {
    pub num_cached_queries: usize,
    pub total_cached_archetypes: usize,
    pub total_archetypes: usize,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory statistics for the world.
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub entity_index_memory: usize,
    pub archetype_memory: usize,
    pub total_memory: usize,
}
