//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_ecs::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::archetype::{Archetype, BundleId};
pub use crate::command::CommandBuffer;
pub use crate::component::{
    Bundle, Component, ComponentHooks, ComponentInfo, Components, HookContext, SparseStorage,
    StorageKind,
};
pub use crate::entity::{Entity, EntityLocation};
pub use crate::error::{EcsError, Result};
pub use crate::event::{EventReader, EventWriter, Events};
pub use crate::executor::{Executor, SystemProfiler, SystemStats};
pub use crate::plugin::Plugin;
pub use crate::query::{
    Added, Changed, Query, QueryFetch, QueryFetchMut, QueryFilter, QueryMut, With, Without,
};
pub use crate::render::{
    CommandList, GraphContext, Node, RenderContext, RenderDevice, RenderGraph, RenderGraphRunner,
    SlotInfo, SlotType, SlotValue,
};
pub use crate::schedule::{RunCondition, Schedule, Stage};
pub use crate::system::{BoxedSystem, Commands, IntoSystem, Local, Res, ResMut, System, SystemAccess, SystemId};
pub use crate::type_registry::{ComponentId, TypeInfo, TypeRegistry};
pub use crate::world::World;
