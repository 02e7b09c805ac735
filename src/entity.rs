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

//! Entity identifiers, locations, and the generational allocator.
//!
//! `Entity` is a plain `(generation, index)` handle rather than a slotmap
//! key: the allocator below needs direct control over the free list and a
//! lock-free reservation cursor, which a generic slot map does not expose.

use std::sync::atomic::{AtomicI64, Ordering};

/// A handle to an entity: a generation counter paired with a dense index.
///
/// Two entities are equal only if both halves match; a freed index that
/// gets reused is given a bumped generation so stale handles compare unequal
/// to the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub generation: u32,
    pub index: u32,
}

impl Entity {
    /// Build a handle for a brand new index (generation 0).
    pub const fn from_index(index: u32) -> Self {
        Self { generation: 0, index }
    }

    /// Build a handle from explicit parts.
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { generation, index }
    }

    /// A placeholder handle that can never be returned by a live allocator.
    pub const PLACEHOLDER: Entity = Entity { generation: u32::MAX, index: u32::MAX };
}

impl Default for Entity {
    fn default() -> Self {
        Entity::PLACEHOLDER
    }
}

/// Where an entity's components currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: u32,
    pub archetype_row: u32,
    pub table_id: u32,
    pub table_row: u32,
}

impl EntityLocation {
    /// Sentinel marking a reserved-but-unflushed or freed entity.
    pub const INVALID: EntityLocation = EntityLocation {
        archetype_id: u32::MAX,
        archetype_row: u32::MAX,
        table_id: u32::MAX,
        table_row: u32::MAX,
    };

    pub fn is_valid(&self) -> bool {
        self.archetype_id != u32::MAX
    }
}

impl Default for EntityLocation {
    fn default() -> Self {
        EntityLocation::INVALID
    }
}

#[derive(Debug, Clone, Copy)]
struct EntityMeta {
    generation: u32,
    location: EntityLocation,
}

impl EntityMeta {
    const fn empty() -> Self {
        Self { generation: 0, location: EntityLocation::INVALID }
    }
}

/// Generational entity allocator with lock-free reservation.
///
/// `free_cursor` is a signed view of the free list: a non-negative value is
/// an index into `pending` that has not yet been popped; a negative value
/// means `-free_cursor` fresh indices beyond `meta.len()` have been promised
/// to callers of `reserve_entity(s)` but not yet materialised by `flush`.
pub struct Entities {
    meta: Vec<EntityMeta>,
    pending: Vec<u32>,
    free_cursor: AtomicI64,
}

impl Default for Entities {
    fn default() -> Self {
        Self::new()
    }
}

impl Entities {
    pub fn new() -> Self {
        Self { meta: Vec::new(), pending: Vec::new(), free_cursor: AtomicI64::new(0) }
    }

    /// Reserve a single entity id without taking a lock.
    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            let idx = self.pending[(n - 1) as usize];
            Entity::from_parts(idx, self.meta[idx as usize].generation)
        } else {
            let idx = (self.meta.len() as i64 - n) as u32;
            Entity::from_index(idx)
        }
    }

    /// Reserve `count` entity ids without taking a lock.
    pub fn reserve_entities(&self, count: u32) -> Vec<Entity> {
        let range_end = self.free_cursor.fetch_sub(count as i64, Ordering::Relaxed);
        let range_start = range_end - count as i64;
        let base = self.meta.len() as i64;

        (range_start..range_end)
            .map(|idx| {
                if idx < 0 {
                    Entity::from_index((base - idx - 1) as u32)
                } else {
                    let pending_idx = self.pending[idx as usize];
                    Entity::from_parts(pending_idx, self.meta[pending_idx as usize].generation)
                }
            })
            .collect()
    }

    fn verify_flush(&self) {
        debug_assert!(!self.needs_flush(), "entities must be flushed before mutating access");
    }

    /// Allocate an entity id immediately (no flush needed afterward).
    pub fn alloc(&mut self) -> Entity {
        self.verify_flush();
        if let Some(index) = self.pending.pop() {
            self.free_cursor.store(self.pending.len() as i64, Ordering::Relaxed);
            Entity::from_parts(index, self.meta[index as usize].generation)
        } else {
            let index = self.meta.len() as u32;
            self.meta.push(EntityMeta::empty());
            Entity::from_index(index)
        }
    }

    /// Free an entity, returning its last known location if it was alive.
    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flush();
        let meta = self.meta.get_mut(entity.index as usize)?;
        if meta.generation != entity.generation {
            return None;
        }
        meta.generation = meta.generation.wrapping_add(1);
        let loc = meta.location;
        meta.location = EntityLocation::INVALID;
        self.pending.push(entity.index);
        self.free_cursor.store(self.pending.len() as i64, Ordering::Relaxed);
        Some(loc)
    }

    /// Ensure at least `count` allocations can be made without reallocating `meta`.
    pub fn reserve(&mut self, count: u32) {
        self.verify_flush();
        let free_size = self.free_cursor.load(Ordering::Relaxed);
        let reserve_size = count as i64 - free_size;
        if reserve_size > 0 {
            self.meta.reserve(reserve_size as usize);
        }
    }

    /// True if `entity` is currently alive (not freed, not merely reserved).
    pub fn contains(&self, entity: Entity) -> bool {
        self.resolve_index(entity.index).map(|e| e.generation == entity.generation).unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.meta.clear();
        self.pending.clear();
        self.free_cursor.store(0, Ordering::Relaxed);
    }

    /// Current location of a live entity; `None` for freed or unflushed ones.
    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        let meta = self.meta.get(entity.index as usize)?;
        if meta.generation != entity.generation || !meta.location.is_valid() {
            return None;
        }
        Some(meta.location)
    }

    /// Patch the location of an already-flushed entity index.
    pub fn set(&mut self, index: u32, location: EntityLocation) {
        self.meta[index as usize].location = location;
    }

    /// Bump the generation of a currently-free slot, protecting stale weak handles.
    pub fn reserve_generations(&mut self, index: u32, generations: u32) -> bool {
        match self.meta.get_mut(index as usize) {
            Some(meta) if !meta.location.is_valid() => {
                meta.generation = meta.generation.wrapping_add(generations);
                true
            }
            _ => false,
        }
    }

    /// Resolve the entity currently occupying `index`, including unflushed
    /// reservations and freed-but-not-reused slots.
    pub fn resolve_index(&self, index: u32) -> Option<Entity> {
        if (index as usize) < self.meta.len() {
            return Some(Entity::from_parts(index, self.meta[index as usize].generation));
        }
        let free = self.free_cursor.load(Ordering::Relaxed);
        if free > 0 {
            return None;
        }
        if (index as usize) < self.meta.len() + (-free) as usize {
            Some(Entity::from_index(index))
        } else {
            None
        }
    }

    pub fn needs_flush(&self) -> bool {
        self.free_cursor.load(Ordering::Relaxed) != self.pending.len() as i64
    }

    /// Materialise all outstanding reservations, calling `init` once per
    /// newly-visible entity (fresh or recycled) so the caller can set its
    /// starting location.
    pub fn flush(&mut self, mut init: impl FnMut(Entity, &mut EntityLocation)) {
        let mut n = self.free_cursor.load(Ordering::Relaxed);
        if n < 0 {
            let old_len = self.meta.len();
            let new_len = old_len + (-n) as usize;
            self.meta.resize(new_len, EntityMeta::empty());
            for index in old_len..new_len {
                let generation = self.meta[index].generation;
                let mut loc = self.meta[index].location;
                init(Entity::from_parts(index as u32, generation), &mut loc);
                self.meta[index].location = loc;
            }
            self.free_cursor.store(0, Ordering::Relaxed);
            n = 0;
        }

        let n = n as usize;
        for &index in &self.pending[..n] {
            let generation = self.meta[index as usize].generation;
            let mut loc = self.meta[index as usize].location;
            init(Entity::from_parts(index, generation), &mut loc);
            self.meta[index as usize].location = loc;
        }
        self.pending.truncate(n);
    }

    /// Flush all reservations straight to the invalid sentinel (no storage
    /// backing allocated yet).
    pub fn flush_as_invalid(&mut self) {
        self.flush(|_, loc| *loc = EntityLocation::INVALID);
    }

    /// All indices ever allocated, flushed.
    pub fn total_count(&self) -> usize {
        self.meta.len()
    }

    /// Allocated-or-reserved minus freed.
    pub fn used_count(&self) -> usize {
        self.meta.len() - self.free_cursor.load(Ordering::Relaxed).max(0) as usize
    }

    /// What `total_count` would be if `flush` ran right now.
    pub fn total_prospective_count(&self) -> usize {
        self.meta.len() + (-self.free_cursor.load(Ordering::Relaxed)).max(0) as usize
    }

    /// Count of currently allocated (non-freed) entities.
    pub fn size(&self) -> usize {
        self.meta.len() - self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_bumps_generation() {
        let mut entities = Entities::new();
        let e1 = entities.alloc();
        entities.set(e1.index, EntityLocation { archetype_id: 0, archetype_row: 0, table_id: 0, table_row: 0 });
        let loc = entities.free(e1).unwrap();
        assert!(loc.is_valid());
        let e2 = entities.alloc();
        assert_eq!(e2.index, e1.index);
        assert!(e2.generation > e1.generation);
        assert!(!entities.contains(e1));
    }

    #[test]
    fn reserve_entity_then_flush_is_observable() {
        let entities = Entities::new();
        let reserved = entities.reserve_entities(5);
        assert_eq!(reserved.len(), 5);
        assert!(entities.needs_flush());

        let mut entities = entities;
        let mut seen = Vec::new();
        entities.flush(|e, loc| {
            seen.push(e);
            *loc = EntityLocation { archetype_id: 0, archetype_row: 0, table_id: 0, table_row: 0 };
        });
        assert!(!entities.needs_flush());
        assert_eq!(seen.len(), 5);
        assert_eq!(entities.total_count(), 5);
        for e in reserved {
            assert!(entities.contains(e));
        }
    }

    #[test]
    fn reserve_recycles_freed_indices() {
        let mut entities = Entities::new();
        let e1 = entities.alloc();
        entities.flush_as_invalid();
        entities.free(e1);

        let reserved = entities.reserve_entity();
        assert_eq!(reserved.index, e1.index);
        assert!(reserved.generation > e1.generation);
    }

    #[test]
    fn total_count_matches_distinct_indices() {
        let mut entities = Entities::new();
        let mut issued = std::collections::HashSet::new();
        for _ in 0..50 {
            let e = entities.alloc();
            issued.insert(e.index);
        }
        assert_eq!(entities.total_count(), issued.len());
    }
}
