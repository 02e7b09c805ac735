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

//! System trait, access metadata, and the `SystemParam` model that lets
//! plain functions be adapted into systems.

use std::any::TypeId;
use std::marker::PhantomData;

use crate::error::Result;
use crate::event::{EventReader, EventWriter, Events};
use crate::query::{QueryFetchMut, QueryFilter, QueryMut};
use crate::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// Component-level read/write access declared by a system, used by the
/// scheduler to detect conflicts between systems with no explicit ordering.
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: Vec<TypeId>,
    pub writes: Vec<TypeId>,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        for w1 in &self.writes {
            if other.writes.contains(w1) || other.reads.contains(w1) {
                return true;
            }
        }
        for r in &self.reads {
            if other.writes.contains(r) {
                return true;
            }
        }
        false
    }
}

/// A runnable unit of scheduler-visible work.
pub trait System: Send + Sync {
    fn access(&self) -> SystemAccess;
    fn name(&self) -> &'static str;
    fn run(&mut self, world: &mut World) -> Result<()>;
}

pub type BoxedSystem = Box<dyn System>;

/// A value a system function can take by reference, resolved fresh from the
/// `World` (and the system's own persistent local state) on every run.
pub trait SystemParam {
    type Item<'w>;
    type State: Default + Send + Sync + 'static;

    fn access(_state: &Self::State) -> SystemAccess {
        SystemAccess::empty()
    }

    fn get_param<'w>(state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w>;
}

/// Read-only access to a resource.
pub struct Res<'w, R: 'static> {
    value: &'w R,
}

impl<'w, R: 'static> std::ops::Deref for Res<'w, R> {
    type Target = R;
    fn deref(&self) -> &R {
        self.value
    }
}

impl<R: Send + Sync + 'static> SystemParam for Res<'_, R> {
    type Item<'w> = Res<'w, R>;
    type State = ();

    fn access(_state: &Self::State) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.reads.push(TypeId::of::<R>());
        access
    }

    fn get_param<'w>(_state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w> {
        let value = world.resource::<R>().unwrap_or_else(|| panic!("resource {} not found", std::any::type_name::<R>()));
        Res { value }
    }
}

/// Mutable access to a resource.
pub struct ResMut<'w, R: 'static> {
    value: &'w mut R,
}

impl<'w, R: 'static> std::ops::Deref for ResMut<'w, R> {
    type Target = R;
    fn deref(&self) -> &R {
        self.value
    }
}

impl<'w, R: 'static> std::ops::DerefMut for ResMut<'w, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.value
    }
}

impl<R: Send + Sync + 'static> SystemParam for ResMut<'_, R> {
    type Item<'w> = ResMut<'w, R>;
    type State = ();

    fn access(_state: &Self::State) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.writes.push(TypeId::of::<R>());
        access
    }

    fn get_param<'w>(_state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w> {
        let value = world.resource_mut::<R>().unwrap_or_else(|| panic!("resource {} not found", std::any::type_name::<R>()));
        ResMut { value }
    }
}

/// Per-system persistent state, initialized with `Default` on first run and
/// kept across subsequent runs (e.g. an accumulator or a cached handle).
pub struct Local<'s, T> {
    value: &'s mut T,
}

impl<'s, T> std::ops::Deref for Local<'s, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value
    }
}

impl<'s, T> std::ops::DerefMut for Local<'s, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T: Default + Send + Sync + 'static> SystemParam for Local<'_, T> {
    type Item<'w> = Local<'w, T>;
    type State = T;

    fn get_param<'w>(state: &'w mut Self::State, _world: &'w mut World) -> Self::Item<'w> {
        Local { value: state }
    }
}

/// Deferred structural-mutation buffer. Commands queued here land in the
/// `World`'s shared, mutex-guarded buffer rather than per-system state, so
/// any number of systems can queue commands even when the scheduler runs
/// them concurrently; the scheduler drains and applies them once per frame
/// after every system has returned.
pub struct Commands<'w> {
    world: &'w World,
}

impl<'w> Commands<'w> {
    pub fn spawn<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.world.pending_commands().spawn(f);
    }

    /// Reserve an entity id immediately, lock-free, so the caller can use it
    /// (e.g. to queue further commands referencing it) in the same system,
    /// and queue `bundle` to be written into it at the frame barrier.
    pub fn spawn_bundle<B: crate::component::Bundle>(&mut self, bundle: B) -> crate::entity::Entity {
        let entity = self.world.reserve_entity();
        self.world.pending_commands().add(move |world| world.insert_bundle_into_reserved(entity, bundle));
        entity
    }

    pub fn despawn(&mut self, entity: crate::entity::Entity) {
        self.world.pending_commands().despawn(entity);
    }

    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.world.pending_commands().add(f);
    }

    pub fn add_component<T: crate::component::Component>(&mut self, entity: crate::entity::Entity, component: T) {
        self.world.pending_commands().add_component(entity, component);
    }

    pub fn remove_component<T: crate::component::Component>(&mut self, entity: crate::entity::Entity) {
        self.world.pending_commands().remove_component::<T>(entity);
    }
}

impl SystemParam for Commands<'_> {
    type Item<'w> = Commands<'w>;
    type State = ();

    fn get_param<'w>(_state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w> {
        Commands { world }
    }
}

impl<T: Send + Sync + 'static> SystemParam for EventReader<T> {
    type Item<'w> = EventReaderParam<'w, T>;
    type State = EventReader<T>;

    fn access(_state: &Self::State) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.reads.push(TypeId::of::<Events<T>>());
        access
    }

    fn get_param<'w>(state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w> {
        if !world.has_resource::<Events<T>>() {
            world.insert_resource(Events::<T>::new());
        }
        let events = world.resource::<Events<T>>().unwrap();
        EventReaderParam { reader: state, events }
    }
}

pub struct EventReaderParam<'w, T: Send + Sync + 'static> {
    reader: &'w mut EventReader<T>,
    events: &'w Events<T>,
}

impl<'w, T: Send + Sync + 'static> EventReaderParam<'w, T> {
    pub fn read(&mut self) -> impl Iterator<Item = &T> {
        self.reader.read(self.events)
    }
}

impl<T: Send + Sync + 'static> SystemParam for EventWriter<'_, T> {
    type Item<'w> = EventWriter<'w, T>;
    type State = ();

    fn access(_state: &Self::State) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.writes.push(TypeId::of::<Events<T>>());
        access
    }

    fn get_param<'w>(_state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w> {
        if !world.has_resource::<Events<T>>() {
            world.insert_resource(Events::<T>::new());
        }
        EventWriter::new(world.resource_mut::<Events<T>>().unwrap())
    }
}

/// A mutable query, resolved fresh from the world on every run.
pub struct QueryParam<Q>(PhantomData<Q>);

impl<Q> SystemParam for QueryParam<Q>
where
    Q: QueryFilter + Send + Sync + 'static,
    for<'w> Q: QueryFetchMut<'w>,
{
    type Item<'w> = QueryMut<'w, Q>;
    type State = ();

    fn access(_state: &Self::State) -> SystemAccess {
        let mut access = SystemAccess::empty();
        Q::component_access(&mut access);
        access
    }

    fn get_param<'w>(_state: &'w mut Self::State, world: &'w mut World) -> Self::Item<'w> {
        QueryMut::new(world)
    }
}

/// Adapts a plain function into a `System`, resolving each parameter via
/// `SystemParam` on every invocation.
pub trait IntoSystem<Params> {
    type System: System;
    fn into_system(self, name: &'static str) -> Self::System;
}

macro_rules! impl_into_system {
    ($($P:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<Func, $($P: SystemParam + 'static),*> IntoSystem<($($P,)*)> for Func
        where
            Func: Send + Sync + 'static,
            for<'w> &'w mut Func: FnMut($($P::Item<'w>),*),
        {
            type System = FunctionSystem<Func, ($($P::State,)*)>;

            fn into_system(self, name: &'static str) -> Self::System {
                FunctionSystem { func: self, state: Default::default(), name }
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<Func, $($P: SystemParam + 'static),*> System for FunctionSystem<Func, ($($P::State,)*)>
        where
            Func: Send + Sync + 'static,
            for<'w> &'w mut Func: FnMut($($P::Item<'w>),*),
        {
            fn access(&self) -> SystemAccess {
                let mut access = SystemAccess::empty();
                let ($($P,)*) = &self.state;
                $(
                    let p = $P::access($P);
                    access.reads.extend(p.reads);
                    access.writes.extend(p.writes);
                )*
                access
            }

            fn name(&self) -> &'static str {
                self.name
            }

            fn run(&mut self, world: &mut World) -> Result<()> {
                fn call_inner<$($P),*>(mut f: impl FnMut($($P),*), $($P: $P),*) {
                    f($($P),*)
                }

                let ($($P,)*) = &mut self.state;
                let world_ptr = world as *mut World;
                $(
                    // SAFETY: each SystemParam::get_param borrow is scoped to this
                    // call and the scheduler guarantees no conflicting system runs
                    // concurrently against the same world region.
                    let $P = $P::get_param($P, unsafe { &mut *world_ptr });
                )*
                call_inner(&mut self.func, $($P),*);
                Ok(())
            }
        }
    };
}

/// A function adapted into a `System`, with per-parameter persistent state.
pub struct FunctionSystem<Func, State> {
    func: Func,
    state: State,
    name: &'static str,
}

impl_into_system!();
impl_into_system!(A);
impl_into_system!(A, B);
impl_into_system!(A, B, C);
impl_into_system!(A, B, C, D);
impl_into_system!(A, B, C, D, E);
