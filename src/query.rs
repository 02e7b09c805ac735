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

//! Query system with archetype filtering
//!
//! Type-safe component queries with automatic archetype matching, plus
//! `Changed<T>`/`Added<T>` filters driven by the archetype's per-row ticks.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;

use smallvec::{smallvec, SmallVec};

use crate::archetype::{tick_newer_than, Archetype, ComponentColumn};
use crate::component::Component;
use crate::entity::Entity;
use crate::system::SystemAccess;
use crate::world::World;

const MAX_FILTER_COMPONENTS: usize = 8;

/// Component signature for query caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySignature {
    pub required: SmallVec<[TypeId; 8]>,
    pub excluded: SmallVec<[TypeId; 8]>,
}

impl Default for QuerySignature {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySignature {
    pub fn new() -> Self {
        Self { required: SmallVec::new(), excluded: SmallVec::new() }
    }

    pub fn matches(&self, archetype: &Archetype) -> bool {
        for &req in &self.required {
            if !archetype.has_column(req) {
                return false;
            }
        }
        for &exc in &self.excluded {
            if archetype.has_column(exc) {
                return false;
            }
        }
        true
    }
}

/// Cached result for a specific query signature.
pub struct CachedQueryResult {
    pub matches: Vec<usize>,
    pub seen_archetypes: usize,
    pub signature: QuerySignature,
}

impl CachedQueryResult {
    pub fn new(signature: QuerySignature, archetypes: &[Archetype]) -> Self {
        let matched =
            archetypes.iter().enumerate().filter_map(|(id, arch)| if signature.matches(arch) { Some(id) } else { None }).collect();

        Self { matches: matched, seen_archetypes: archetypes.len(), signature }
    }

    pub fn update(&mut self, archetypes: &[Archetype]) {
        let count = archetypes.len();
        if count > self.seen_archetypes {
            for (id, arch) in archetypes.iter().enumerate().skip(self.seen_archetypes) {
                if self.signature.matches(arch) {
                    self.matches.push(id);
                }
            }
            self.seen_archetypes = count;
        }
    }
}

/// Query filter trait for type-level archetype matching.
pub trait QueryFilter {
    fn matches_archetype(archetype: &Archetype) -> bool;
    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]>;

    fn signature() -> QuerySignature {
        let mut sig = QuerySignature::new();
        sig.required = Self::type_ids();
        sig.required.sort_by_key(|t| format!("{t:?}"));
        sig
    }

    /// Record the component-level reads/writes this filter performs, so a
    /// `QueryParam<Q>` system can report them as part of its `SystemAccess`.
    /// Presence-only filters (`With`/`Without`) contribute nothing.
    fn component_access(_access: &mut SystemAccess) {}
}

/// Fetch trait for immutable query data.
///
/// # Safety
/// Implementations must ensure `fetch` is only called with state from `prepare`.
pub unsafe trait QueryFetch<'w>: QueryFilter {
    type Item;
    type State;

    fn prepare(archetype: &'w Archetype, change_tick: u32) -> Option<Self::State>;

    /// # Safety
    /// `row` must be valid for the archetype used in `prepare`.
    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item>;
}

/// Fetch trait for mutable query data.
///
/// # Safety
/// Implementations must ensure `fetch` is only called with state from `prepare`.
pub unsafe trait QueryFetchMut<'w>: QueryFilter {
    type Item;
    type State;

    fn prepare(archetype: &'w mut Archetype, change_tick: u32, current_tick: u32) -> Option<Self::State>;

    /// # Safety
    /// `row` must be valid and not aliased across concurrent fetches.
    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item>;
}

impl<T: Component> QueryFilter for &T {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.has_column(TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }

    fn component_access(access: &mut SystemAccess) {
        access.reads.push(TypeId::of::<T>());
    }
}

unsafe impl<'w, T: Component> QueryFetch<'w> for &'w T {
    type Item = &'w T;
    type State = &'w ComponentColumn;

    fn prepare(archetype: &'w Archetype, _change_tick: u32) -> Option<Self::State> {
        archetype.get_column(TypeId::of::<T>())
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        state.get::<T>(row)
    }
}

impl<T: Component> QueryFilter for &mut T {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.has_column(TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }

    fn component_access(access: &mut SystemAccess) {
        access.writes.push(TypeId::of::<T>());
    }
}

unsafe impl<'w, T: Component> QueryFetchMut<'w> for &'w mut T {
    type Item = &'w mut T;
    type State = (*mut ComponentColumn, u32);

    fn prepare(archetype: &'w mut Archetype, _change_tick: u32, current_tick: u32) -> Option<Self::State> {
        let column = archetype.get_column_mut(TypeId::of::<T>())?;
        Some((column as *mut ComponentColumn, current_tick))
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        let (column_ptr, current_tick) = state;
        let column = unsafe { &mut **column_ptr };
        column.set_changed(row, *current_tick);
        column.get_mut::<T>(row)
    }
}

/// Allows mixed mutability tuples, e.g. `(&Position, &mut Velocity)`.
unsafe impl<'w, T: Component> QueryFetchMut<'w> for &'w T {
    type Item = &'w T;
    type State = *const ComponentColumn;

    fn prepare(archetype: &'w mut Archetype, _change_tick: u32, _current_tick: u32) -> Option<Self::State> {
        archetype.get_column(TypeId::of::<T>()).map(|col| col as *const ComponentColumn)
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        let column = unsafe { &**state };
        column.get::<T>(row)
    }
}

impl QueryFilter for Entity {
    fn matches_archetype(_archetype: &Archetype) -> bool {
        true
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![]
    }
}

unsafe impl<'w> QueryFetch<'w> for Entity {
    type Item = Entity;
    type State = &'w [Entity];

    fn prepare(archetype: &'w Archetype, _change_tick: u32) -> Option<Self::State> {
        Some(archetype.entities())
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        state.get(row).copied()
    }
}

unsafe impl<'w> QueryFetchMut<'w> for Entity {
    type Item = Entity;
    type State = *const [Entity];

    fn prepare(archetype: &'w mut Archetype, _change_tick: u32, _current_tick: u32) -> Option<Self::State> {
        Some(archetype.entities() as *const [Entity])
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        let slice = unsafe { &**state };
        slice.get(row).copied()
    }
}

/// Filter requiring component `T` to be present, without fetching it.
pub struct With<T>(PhantomData<T>);

impl<T: 'static> QueryFilter for With<T> {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.has_column(TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }
}

unsafe impl<'w, T: 'static> QueryFetch<'w> for With<T> {
    type Item = ();
    type State = ();

    fn prepare(_archetype: &'w Archetype, _change_tick: u32) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch(_state: &Self::State, _row: usize) -> Option<Self::Item> {
        Some(())
    }
}

unsafe impl<'w, T: 'static> QueryFetchMut<'w> for With<T> {
    type Item = ();
    type State = ();

    fn prepare(_archetype: &'w mut Archetype, _change_tick: u32, _current_tick: u32) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch(_state: &mut Self::State, _row: usize) -> Option<Self::Item> {
        Some(())
    }
}

/// Filter requiring component `T` to be absent.
pub struct Without<T>(PhantomData<T>);

impl<T: 'static> QueryFilter for Without<T> {
    fn matches_archetype(archetype: &Archetype) -> bool {
        !archetype.has_column(TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![]
    }
}

unsafe impl<'w, T: 'static> QueryFetch<'w> for Without<T> {
    type Item = ();
    type State = ();

    fn prepare(_archetype: &'w Archetype, _change_tick: u32) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch(_state: &Self::State, _row: usize) -> Option<Self::Item> {
        Some(())
    }
}

unsafe impl<'w, T: 'static> QueryFetchMut<'w> for Without<T> {
    type Item = ();
    type State = ();

    fn prepare(_archetype: &'w mut Archetype, _change_tick: u32, _current_tick: u32) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch(_state: &mut Self::State, _row: usize) -> Option<Self::Item> {
        Some(())
    }
}

/// Filter matching rows where `T` changed after the query's last-run tick.
pub struct Changed<T: Component>(PhantomData<T>);

impl<T: Component> QueryFilter for Changed<T> {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.has_column(TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }

    fn component_access(access: &mut SystemAccess) {
        access.reads.push(TypeId::of::<T>());
    }
}

unsafe impl<'w, T: Component> QueryFetch<'w> for Changed<T> {
    type Item = ();
    type State = (&'w ComponentColumn, u32);

    fn prepare(archetype: &'w Archetype, change_tick: u32) -> Option<Self::State> {
        let col = archetype.get_column(TypeId::of::<T>())?;
        if !col.changed_since(change_tick) {
            return None;
        }
        Some((col, change_tick))
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        let (col, since) = state;
        tick_newer_than(col.changed_tick(row), *since).then_some(())
    }
}

unsafe impl<'w, T: Component> QueryFetchMut<'w> for Changed<T> {
    type Item = ();
    type State = (*const ComponentColumn, u32);

    fn prepare(archetype: &'w mut Archetype, change_tick: u32, _current_tick: u32) -> Option<Self::State> {
        let col = archetype.get_column(TypeId::of::<T>())?;
        if !col.changed_since(change_tick) {
            return None;
        }
        Some((col as *const ComponentColumn, change_tick))
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        let (col, since) = state;
        let col = unsafe { &**col };
        tick_newer_than(col.changed_tick(row), *since).then_some(())
    }
}

/// Filter matching rows where `T` was added after the query's last-run tick.
pub struct Added<T: Component>(PhantomData<T>);

impl<T: Component> QueryFilter for Added<T> {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.has_column(TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }

    fn component_access(access: &mut SystemAccess) {
        access.reads.push(TypeId::of::<T>());
    }
}

unsafe impl<'w, T: Component> QueryFetch<'w> for Added<T> {
    type Item = ();
    type State = (&'w ComponentColumn, u32);

    fn prepare(archetype: &'w Archetype, change_tick: u32) -> Option<Self::State> {
        let col = archetype.get_column(TypeId::of::<T>())?;
        if !col.added_since(change_tick) {
            return None;
        }
        Some((col, change_tick))
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        let (col, since) = state;
        tick_newer_than(col.added_tick(row), *since).then_some(())
    }
}

unsafe impl<'w, T: Component> QueryFetchMut<'w> for Added<T> {
    type Item = ();
    type State = (*const ComponentColumn, u32);

    fn prepare(archetype: &'w mut Archetype, change_tick: u32, _current_tick: u32) -> Option<Self::State> {
        let col = archetype.get_column(TypeId::of::<T>())?;
        if !col.added_since(change_tick) {
            return None;
        }
        Some((col as *const ComponentColumn, change_tick))
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        let (col, since) = state;
        let col = unsafe { &**col };
        tick_newer_than(col.added_tick(row), *since).then_some(())
    }
}

macro_rules! impl_query_filter {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T: QueryFilter),*> QueryFilter for ($($T,)*) {
            fn matches_archetype(archetype: &Archetype) -> bool {
                $($T::matches_archetype(archetype))&&*
            }

            fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
                let mut ids = SmallVec::new();
                $(ids.extend($T::type_ids());)*
                ids
            }

            fn component_access(access: &mut SystemAccess) {
                $($T::component_access(access);)*
            }
        }
    };
}

impl_query_filter!(A);
impl_query_filter!(A, B);
impl_query_filter!(A, B, C);
impl_query_filter!(A, B, C, D);
impl_query_filter!(A, B, C, D, E);
impl_query_filter!(A, B, C, D, E, F);
impl_query_filter!(A, B, C, D, E, F, G);
impl_query_filter!(A, B, C, D, E, F, G, H);

macro_rules! impl_query_fetch_tuple {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        unsafe impl<'w, $($T: QueryFetch<'w>),*> QueryFetch<'w> for ($($T,)*) {
            type Item = ($($T::Item,)*);
            type State = ($($T::State,)*);

            fn prepare(archetype: &'w Archetype, change_tick: u32) -> Option<Self::State> {
                Some(($($T::prepare(archetype, change_tick)?,)*))
            }

            unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
                let ($($T,)*) = state;
                Some(($(unsafe { $T::fetch($T, row)? },)*))
            }
        }
    };
}

impl_query_fetch_tuple!(A);
impl_query_fetch_tuple!(A, B);
impl_query_fetch_tuple!(A, B, C);
impl_query_fetch_tuple!(A, B, C, D);
impl_query_fetch_tuple!(A, B, C, D, E);

macro_rules! impl_query_fetch_mut_tuple {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        unsafe impl<'w, $($T: QueryFetchMut<'w>),*> QueryFetchMut<'w> for ($($T,)*) {
            type Item = ($($T::Item,)*);
            type State = ($($T::State,)*);

            fn prepare(archetype: &'w mut Archetype, change_tick: u32, current_tick: u32) -> Option<Self::State> {
                let ptr = archetype as *mut Archetype;
                Some(($(unsafe { $T::prepare(&mut *ptr, change_tick, current_tick)? },)*))
            }

            unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
                let ($($T,)*) = state;
                Some(($(unsafe { $T::fetch($T, row)? },)*))
            }
        }
    };
}

impl_query_fetch_mut_tuple!(A);
impl_query_fetch_mut_tuple!(A, B);
impl_query_fetch_mut_tuple!(A, B, C);
impl_query_fetch_mut_tuple!(A, B, C, D);
impl_query_fetch_mut_tuple!(A, B, C, D, E);

/// Stateless immutable query bound to a `World` borrow.
pub struct Query<'w, Q>
where
    Q: QueryFilter + QueryFetch<'w>,
{
    world: &'w World,
    _phantom: PhantomData<Q>,
}

impl<'w, Q> Query<'w, Q>
where
    Q: QueryFilter + QueryFetch<'w>,
{
    pub fn new(world: &'w World) -> Self {
        Self { world, _phantom: PhantomData }
    }

    pub fn iter(&self) -> QueryIterOwned<'w, Q> {
        let matched = self.world.get_cached_query_indices::<Q>();
        QueryIterOwned { world: self.world, matches: matched, archetype_index: 0, entity_index: 0, change_tick: 0, state: None, _phantom: PhantomData }
    }

    pub fn count(&self) -> usize {
        let matched = self.world.get_cached_query_indices::<Q>();
        matched.iter().filter_map(|&id| self.world.get_archetype(id)).map(|arch| arch.len()).sum()
    }

    pub fn get(&self, entity: Entity) -> Option<Q::Item> {
        self.world.get_components::<Q>(entity)
    }
}

pub struct QueryIterOwned<'w, Q: QueryFilter>
where
    Q: QueryFetch<'w>,
{
    world: &'w World,
    matches: Vec<usize>,
    archetype_index: usize,
    entity_index: usize,
    change_tick: u32,
    state: Option<Q::State>,
    _phantom: PhantomData<Q>,
}

impl<'w, Q> Iterator for QueryIterOwned<'w, Q>
where
    Q: QueryFilter + QueryFetch<'w>,
{
    type Item = <Q as QueryFetch<'w>>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state.is_none() {
                if self.archetype_index >= self.matches.len() {
                    return None;
                }
                let arch_id = self.matches[self.archetype_index];
                let archetype = self.world.get_archetype(arch_id)?;
                self.state = Q::prepare(archetype, self.change_tick);
                self.entity_index = 0;
                if self.state.is_none() {
                    self.archetype_index += 1;
                    continue;
                }
            }

            let arch_id = self.matches[self.archetype_index];
            let archetype = self.world.get_archetype(arch_id)?;
            if self.entity_index < archetype.len() {
                let row = self.entity_index;
                self.entity_index += 1;
                if let Some(item) = unsafe { Q::fetch(self.state.as_ref().unwrap(), row) } {
                    return Some(item);
                }
            } else {
                self.state = None;
                self.archetype_index += 1;
            }
        }
    }
}

/// Stateful mutable query bound to a `World` borrow.
pub struct QueryMut<'w, Q>
where
    Q: QueryFilter + QueryFetchMut<'w>,
{
    world: &'w mut World,
    _phantom: PhantomData<Q>,
}

impl<'w, Q> QueryMut<'w, Q>
where
    Q: QueryFilter + QueryFetchMut<'w>,
{
    pub fn new(world: &'w mut World) -> Self {
        Self { world, _phantom: PhantomData }
    }

    pub fn iter(&'w mut self) -> QueryIterMut<'w, Q> {
        let matched = self.world.get_cached_query_indices::<Q>();
        let tick = self.world.change_tick();
        QueryIterMut::new(self.world, &matched, 0, tick)
    }

    pub fn iter_since(&'w mut self, since: u32) -> QueryIterMut<'w, Q> {
        let matched = self.world.get_cached_query_indices::<Q>();
        let tick = self.world.change_tick();
        QueryIterMut::new(self.world, &matched, since, tick)
    }

    pub fn count(&mut self) -> usize {
        let matched = self.world.get_cached_query_indices::<Q>();
        matched.iter().filter_map(|&id| self.world.get_archetype(id)).map(|arch| arch.len()).sum()
    }

    #[cfg(feature = "parallel")]
    pub fn par_for_each<F>(&mut self, func: F)
    where
        F: Fn(Q::Item) + Send + Sync,
        Q: Send + Sync,
        Q::Item: Send,
    {
        use rayon::prelude::*;

        let matched = self.world.get_cached_query_indices::<Q>();
        let current_tick = self.world.change_tick();
        let world_ptr = self.world as *mut World as usize;

        matched.par_iter().for_each(|&arch_id| {
            // SAFETY: every index in `matched` names a distinct archetype, so
            // concurrent mutable access across archetypes never aliases.
            let world = unsafe { &mut *(world_ptr as *mut World) };
            if let Some(archetype) = world.get_archetype_mut(arch_id) {
                let archetype = unsafe { &mut *(archetype as *mut crate::archetype::Archetype) };
                let len = archetype.len();
                if let Some(mut state) = Q::prepare(archetype, 0, current_tick) {
                    for row in 0..len {
                        if let Some(item) = unsafe { Q::fetch(&mut state, row) } {
                            func(item);
                        }
                    }
                }
            }
        });
    }
}

pub struct QueryIterMut<'w, Q: QueryFilter>
where
    Q: QueryFetchMut<'w>,
{
    archetypes: Vec<NonNull<Archetype>>,
    archetype_index: usize,
    entity_index: usize,
    change_tick: u32,
    current_tick: u32,
    state: Option<Q::State>,
    _phantom: PhantomData<&'w mut Q>,
}

impl<'w, Q: QueryFilter> QueryIterMut<'w, Q>
where
    Q: QueryFetchMut<'w>,
{
    fn new(world: &'w mut World, matched: &[usize], change_tick: u32, current_tick: u32) -> Self {
        let mut archetypes = Vec::with_capacity(matched.len());
        for &id in matched {
            if let Some(ptr) = world.archetype_ptr_mut(id) {
                archetypes.push(ptr);
            }
        }
        Self { archetypes, archetype_index: 0, entity_index: 0, change_tick, current_tick, state: None, _phantom: PhantomData }
    }
}

impl<'w, Q> Iterator for QueryIterMut<'w, Q>
where
    Q: QueryFilter + QueryFetchMut<'w>,
{
    type Item = <Q as QueryFetchMut<'w>>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state.is_none() {
                if self.archetype_index >= self.archetypes.len() {
                    return None;
                }
                let archetype_ptr = self.archetypes[self.archetype_index].as_ptr();
                let archetype = unsafe { &mut *archetype_ptr };
                self.state = Q::prepare(archetype, self.change_tick, self.current_tick);
                self.entity_index = 0;
                if self.state.is_none() {
                    self.archetype_index += 1;
                    continue;
                }
            }

            let archetype_ptr = self.archetypes[self.archetype_index].as_ptr();
            let archetype = unsafe { &*archetype_ptr };
            if self.entity_index >= archetype.len() {
                self.state = None;
                self.archetype_index += 1;
                continue;
            }

            let row = self.entity_index;
            self.entity_index += 1;
            if let Some(item) = unsafe { Q::fetch(self.state.as_mut().unwrap(), row) } {
                return Some(item);
            }
        }
    }
}
