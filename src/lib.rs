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

//! AAA ECS - High-performance Entity Component System
//!
//! Production-ready ECS with a parallel scheduler and a render graph.

pub mod app;
pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod executor;
pub mod plugin;
pub mod prelude;
pub mod profiling;
pub mod query;
pub mod render;
pub mod schedule;
pub mod system;
pub mod type_registry;
pub mod utils;
pub mod world;

// Re-exports for convenience
pub use app::App;
pub use archetype::Archetype;
pub use command::CommandBuffer;
pub use component::{Bundle, Component};
pub use entity::Entity;
pub use error::{EcsError, Result};
pub use event::{EventReader, EventWriter, Events};
pub use executor::{Executor, SystemProfiler};
pub use plugin::Plugin;
pub use query::{Query, QueryFetchMut, QueryFilter, QueryMut};
pub use schedule::{Schedule, Stage, SystemGraph};
pub use system::{BoxedSystem, System, SystemAccess, SystemId};
pub use type_registry::{ComponentId, TypeRegistry};
pub use world::World;
