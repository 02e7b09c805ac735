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

//! Archetype storage: dense table columns plus per-archetype sparse columns,
//! change-detection ticks, and a cached edge table for structural moves.
//!
//! A full Bevy-style design gives sparse components their own archetype-wide
//! storage backend shared by every archetype (so adding/removing them never
//! moves a row). Here sparse columns stay scoped to the owning archetype,
//! indexed by row like table columns but backed by a sparse map instead of a
//! flat `Vec`, which keeps row bookkeeping in one place at the cost of a
//! cross-archetype move when a sparse component's presence changes the
//! signature. This trade-off is recorded in the project design notes.

use std::any::TypeId;

use rustc_hash::FxHashMap;

use crate::component::{Component, StorageKind};
use crate::entity::Entity;

/// Component signature: sorted, deduplicated type ids identifying an archetype.
pub type ArchetypeSignature = Vec<TypeId>;

/// Stable id for a `Bundle` type, used to key the archetype edge cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleId(pub u64);

/// Cached structural-move targets for this archetype, keyed by bundle id.
#[derive(Default)]
pub struct ArchetypeEdges {
    add: FxHashMap<BundleId, u32>,
    remove: FxHashMap<BundleId, u32>,
}

impl ArchetypeEdges {
    pub fn get_add(&self, bundle: BundleId) -> Option<u32> {
        self.add.get(&bundle).copied()
    }

    pub fn set_add(&mut self, bundle: BundleId, target: u32) {
        self.add.insert(bundle, target);
    }

    pub fn get_remove(&self, bundle: BundleId) -> Option<u32> {
        self.remove.get(&bundle).copied()
    }

    pub fn set_remove(&mut self, bundle: BundleId, target: u32) {
        self.remove.insert(bundle, target);
    }
}

/// Archetype: columnar storage for one component signature.
pub struct Archetype {
    signature: ArchetypeSignature,
    entities: Vec<Entity>,
    table_columns: Vec<ComponentColumn>,
    sparse_columns: Vec<ComponentSparseSet>,
    column_indices: FxHashMap<TypeId, ColumnRef>,
    pub edges: ArchetypeEdges,
}

#[derive(Debug, Clone, Copy)]
enum ColumnRef {
    Table(usize),
    Sparse(usize),
}

impl Archetype {
    /// Create a new, empty archetype for `signature`.
    pub fn new(signature: ArchetypeSignature) -> Self {
        Self {
            signature,
            entities: Vec::new(),
            table_columns: Vec::new(),
            sparse_columns: Vec::new(),
            column_indices: FxHashMap::default(),
            edges: ArchetypeEdges::default(),
        }
    }

    /// Build a fresh, empty archetype sharing this one's signature and column
    /// layout (storage kind, size, drop fn) but none of its data.
    pub fn clone_empty(&self) -> Self {
        let mut out = Self::new(self.signature.clone());
        for col in &self.table_columns {
            let idx = out.table_columns.len();
            out.table_columns.push(ComponentColumn::new_raw(col.item_size, col.drop_fn));
            out.column_indices.insert(col.type_id, ColumnRef::Table(idx));
        }
        for col in &self.sparse_columns {
            let idx = out.sparse_columns.len();
            out.sparse_columns.push(ComponentSparseSet::new_raw(col.item_size, col.drop_fn));
            out.column_indices.insert(col.type_id, ColumnRef::Sparse(idx));
        }
        out
    }

    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Allocate a row for `entity` in the table portion of this archetype.
    pub fn allocate_row(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.table_columns {
            column.grow_to(self.entities.len());
        }
        row
    }

    /// Remove `row`, swapping the last row into its place.
    ///
    /// # Safety
    /// Caller must ensure `row` is a valid index within this archetype and
    /// that it owns exclusive access to the removed slot's data.
    pub unsafe fn remove_row(&mut self, row: usize) -> Option<Entity> {
        if row >= self.entities.len() {
            return None;
        }

        self.entities.swap_remove(row);
        for column in &mut self.table_columns {
            column.swap_remove(row);
        }
        for sparse in &mut self.sparse_columns {
            sparse.remove_row(row as u32);
            sparse.relocate_row(self.entities.len() as u32, row as u32);
        }

        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    pub fn get_column(&self, type_id: TypeId) -> Option<&ComponentColumn> {
        match self.column_indices.get(&type_id)? {
            ColumnRef::Table(idx) => self.table_columns.get(*idx),
            ColumnRef::Sparse(_) => None,
        }
    }

    pub fn get_column_mut(&mut self, type_id: TypeId) -> Option<&mut ComponentColumn> {
        match self.column_indices.get(&type_id)? {
            ColumnRef::Table(idx) => self.table_columns.get_mut(*idx),
            ColumnRef::Sparse(_) => None,
        }
    }

    pub fn get_sparse(&self, type_id: TypeId) -> Option<&ComponentSparseSet> {
        match self.column_indices.get(&type_id)? {
            ColumnRef::Sparse(idx) => self.sparse_columns.get(*idx),
            ColumnRef::Table(_) => None,
        }
    }

    pub fn get_sparse_mut(&mut self, type_id: TypeId) -> Option<&mut ComponentSparseSet> {
        match self.column_indices.get(&type_id)? {
            ColumnRef::Sparse(idx) => self.sparse_columns.get_mut(*idx),
            ColumnRef::Table(_) => None,
        }
    }

    pub fn storage_kind_of(&self, type_id: TypeId) -> Option<StorageKind> {
        match self.column_indices.get(&type_id)? {
            ColumnRef::Table(_) => Some(StorageKind::Table),
            ColumnRef::Sparse(_) => Some(StorageKind::Sparse),
        }
    }

    pub fn has_column(&self, type_id: TypeId) -> bool {
        self.column_indices.contains_key(&type_id)
    }

    pub fn get_item_size(&self, type_id: TypeId) -> Option<usize> {
        match self.column_indices.get(&type_id)? {
            ColumnRef::Table(idx) => self.table_columns.get(*idx).map(|c| c.item_size),
            ColumnRef::Sparse(idx) => self.sparse_columns.get(*idx).map(|c| c.item_size),
        }
    }

    pub fn reserve_rows(&mut self, additional: usize) {
        if self.entities.capacity() - self.entities.len() < additional {
            self.entities.reserve(additional);
            for column in &mut self.table_columns {
                column.data.reserve(additional * column.item_size);
            }
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Register a dense (`Table`) column for `T` if one does not exist yet.
    pub fn register_component<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        if !self.column_indices.contains_key(&type_id) {
            let idx = self.table_columns.len();
            let mut column = ComponentColumn::new::<T>();
            column.type_id = type_id;
            column.grow_to(self.entities.len());
            self.table_columns.push(column);
            self.column_indices.insert(type_id, ColumnRef::Table(idx));
        }
    }

    /// Register a column for a dynamically-typed component, choosing the
    /// backend from `storage`. Used when the static type is not known at the
    /// call site (driven from a `ComponentInfo` instead of a generic `T`).
    pub fn add_column_raw(
        &mut self,
        type_id: TypeId,
        size: usize,
        drop_fn: Option<unsafe fn(*mut u8)>,
        storage: StorageKind,
    ) {
        if self.column_indices.contains_key(&type_id) {
            return;
        }
        match storage {
            StorageKind::Table => {
                let idx = self.table_columns.len();
                let mut column = ComponentColumn::new_raw(size, drop_fn);
                column.type_id = type_id;
                column.grow_to(self.entities.len());
                self.table_columns.push(column);
                self.column_indices.insert(type_id, ColumnRef::Table(idx));
            }
            StorageKind::Sparse => {
                let idx = self.sparse_columns.len();
                let mut column = ComponentSparseSet::new_raw(size, drop_fn);
                column.type_id = type_id;
                self.sparse_columns.push(column);
                self.column_indices.insert(type_id, ColumnRef::Sparse(idx));
            }
        }
    }
}

/// Wrap-aware tick comparison: true if `tick` happened after `since`,
/// correct even when the global counter has wrapped past `u32::MAX`.
pub fn tick_newer_than(tick: u32, since: u32) -> bool {
    (tick.wrapping_sub(since) as i32) > 0
}

/// Type-erased dense column with per-row change-detection ticks.
pub struct ComponentColumn {
    type_id: TypeId,
    data: Vec<u8>,
    item_size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
    added_ticks: Vec<u32>,
    changed_ticks: Vec<u32>,
}

impl ComponentColumn {
    pub fn new<T: Component>() -> Self {
        Self::new_raw(
            std::mem::size_of::<T>(),
            if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
        )
    }

    fn new_raw(item_size: usize, drop_fn: Option<unsafe fn(*mut u8)>) -> Self {
        Self {
            type_id: TypeId::of::<()>(),
            data: Vec::new(),
            item_size,
            drop_fn,
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
        }
    }

    fn grow_to(&mut self, len: usize) {
        if self.added_ticks.len() < len {
            self.added_ticks.resize(len, 0);
            self.changed_ticks.resize(len, 0);
        }
        let needed = len * self.item_size;
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
    }

    pub fn get_ptr_mut(&mut self, index: usize) -> *mut u8 {
        self.grow_to(index + 1);
        let offset = index * self.item_size;
        unsafe { self.data.as_mut_ptr().add(offset) }
    }

    pub fn get<T: Component>(&self, index: usize) -> Option<&T> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        Some(unsafe { &*(self.data.as_ptr().add(offset) as *const T) })
    }

    pub fn get_mut<T: Component>(&mut self, index: usize) -> Option<&mut T> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        Some(unsafe { &mut *(self.data.as_mut_ptr().add(offset) as *mut T) })
    }

    pub fn set_added(&mut self, index: usize, tick: u32) {
        self.grow_to(index + 1);
        self.added_ticks[index] = tick;
        self.changed_ticks[index] = tick;
    }

    pub fn set_changed(&mut self, index: usize, tick: u32) {
        self.grow_to(index + 1);
        self.changed_ticks[index] = tick;
    }

    pub fn added_tick(&self, index: usize) -> u32 {
        self.added_ticks.get(index).copied().unwrap_or(0)
    }

    pub fn changed_tick(&self, index: usize) -> u32 {
        self.changed_ticks.get(index).copied().unwrap_or(0)
    }

    pub fn changed_since(&self, since: u32) -> bool {
        self.changed_ticks.iter().any(|&t| tick_newer_than(t, since))
    }

    pub fn added_since(&self, since: u32) -> bool {
        self.added_ticks.iter().any(|&t| tick_newer_than(t, since))
    }

    pub fn get_item_size(&self) -> usize {
        self.item_size
    }

    fn swap_remove(&mut self, row: usize) {
        let count = self.len();
        if row >= count {
            return;
        }
        let last = count - 1;
        unsafe {
            let row_ptr = self.data.as_mut_ptr().add(row * self.item_size);
            if let Some(drop_fn) = self.drop_fn {
                drop_fn(row_ptr);
            }
            if row != last {
                let last_ptr = self.data.as_ptr().add(last * self.item_size);
                std::ptr::copy_nonoverlapping(last_ptr, row_ptr, self.item_size);
            }
        }
        self.data.truncate(last * self.item_size);
        if row != last {
            self.added_ticks[row] = self.added_ticks[last];
            self.changed_ticks[row] = self.changed_ticks[last];
        }
        self.added_ticks.truncate(last);
        self.changed_ticks.truncate(last);
    }

    pub fn len(&self) -> usize {
        if self.item_size == 0 {
            self.added_ticks.len()
        } else {
            self.data.len() / self.item_size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            let count = self.len();
            for i in 0..count {
                let offset = i * self.item_size;
                unsafe {
                    drop_fn(self.data.as_mut_ptr().add(offset));
                }
            }
        }
    }
}

/// Type-erased sparse column: row-indexed via a dense-packed `data` buffer
/// and a row-to-slot map, so rows without the component cost nothing.
pub struct ComponentSparseSet {
    type_id: TypeId,
    data: Vec<u8>,
    item_size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
    row_to_slot: FxHashMap<u32, usize>,
    slot_to_row: Vec<u32>,
    added_ticks: Vec<u32>,
    changed_ticks: Vec<u32>,
}

impl ComponentSparseSet {
    fn new_raw(item_size: usize, drop_fn: Option<unsafe fn(*mut u8)>) -> Self {
        Self {
            type_id: TypeId::of::<()>(),
            data: Vec::new(),
            item_size,
            drop_fn,
            row_to_slot: FxHashMap::default(),
            slot_to_row: Vec::new(),
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
        }
    }

    pub fn contains_row(&self, row: u32) -> bool {
        self.row_to_slot.contains_key(&row)
    }

    /// Allocate or reuse storage for `row`, returning a writable pointer.
    pub fn insert_ptr(&mut self, row: u32, tick: u32) -> *mut u8 {
        let slot = *self.row_to_slot.entry(row).or_insert_with(|| {
            let slot = self.slot_to_row.len();
            self.slot_to_row.push(row);
            self.data.resize(self.data.len() + self.item_size, 0);
            self.added_ticks.push(tick);
            self.changed_ticks.push(tick);
            slot
        });
        self.changed_ticks[slot] = tick;
        let offset = slot * self.item_size;
        unsafe { self.data.as_mut_ptr().add(offset) }
    }

    pub fn get<T: Component>(&self, row: u32) -> Option<&T> {
        let slot = *self.row_to_slot.get(&row)?;
        let offset = slot * self.item_size;
        Some(unsafe { &*(self.data.as_ptr().add(offset) as *const T) })
    }

    pub fn get_mut<T: Component>(&mut self, row: u32) -> Option<&mut T> {
        let slot = *self.row_to_slot.get(&row)?;
        let offset = slot * self.item_size;
        Some(unsafe { &mut *(self.data.as_mut_ptr().add(offset) as *mut T) })
    }

    pub fn added_tick(&self, row: u32) -> u32 {
        self.row_to_slot.get(&row).map(|&s| self.added_ticks[s]).unwrap_or(0)
    }

    pub fn changed_tick(&self, row: u32) -> u32 {
        self.row_to_slot.get(&row).map(|&s| self.changed_ticks[s]).unwrap_or(0)
    }

    /// Remove `row`'s component, if present, swap-packing the backing buffer.
    pub fn remove_row(&mut self, row: u32) {
        let Some(slot) = self.row_to_slot.remove(&row) else { return };
        let last = self.slot_to_row.len() - 1;
        unsafe {
            let slot_ptr = self.data.as_mut_ptr().add(slot * self.item_size);
            if let Some(drop_fn) = self.drop_fn {
                drop_fn(slot_ptr);
            }
            if slot != last {
                let last_ptr = self.data.as_ptr().add(last * self.item_size);
                std::ptr::copy_nonoverlapping(last_ptr, slot_ptr, self.item_size);
            }
        }
        self.data.truncate(last * self.item_size);
        if slot != last {
            let moved_row = self.slot_to_row[last];
            self.slot_to_row[slot] = moved_row;
            self.added_ticks[slot] = self.added_ticks[last];
            self.changed_ticks[slot] = self.changed_ticks[last];
            self.row_to_slot.insert(moved_row, slot);
        }
        self.slot_to_row.pop();
        self.added_ticks.pop();
        self.changed_ticks.pop();
    }

    /// Table rows shift when a table swap-removes its last row into a hole;
    /// re-key a sparse entry tracking `old_row` to `new_row` if it moved there.
    fn relocate_row(&mut self, old_row: u32, new_row: u32) {
        if old_row == new_row {
            return;
        }
        if let Some(slot) = self.row_to_slot.remove(&old_row) {
            self.row_to_slot.insert(new_row, slot);
            self.slot_to_row[slot] = new_row;
        }
    }
}

impl Drop for ComponentSparseSet {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            for slot in 0..self.slot_to_row.len() {
                let offset = slot * self.item_size;
                unsafe {
                    drop_fn(self.data.as_mut_ptr().add(offset));
                }
            }
        }
    }
}
