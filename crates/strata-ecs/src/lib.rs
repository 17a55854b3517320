//! Strata ECS -- an archetype Entity Component System core with fixed-size
//! SoA block storage.
//!
//! Entities are grouped by their component composition (*archetype*). Each
//! archetype stores its entities in a list of 16 KiB memory blocks; inside a
//! block every component type occupies one packed array (Structure of
//! Arrays), so iterating a component subset touches contiguous memory.
//! Generational handles make stale references detectable immediately, and
//! erasure keeps storage dense by relocating the archetype's last entity
//! into the freed slot.
//!
//! An entity's composition is fixed at creation; there is no component
//! add/remove migration in this core. The registry is single-threaded -- an
//! embedder that shares it across threads provides its own synchronization.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! struct Position { x: f32, y: f32 }
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut registry = Registry::new();
//!
//! let e = registry
//!     .create((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.5 }))
//!     .unwrap();
//!
//! registry.each_mut::<(&mut Position, &Velocity)>(|(pos, vel)| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//!
//! assert_eq!(registry.get::<Position>(e).unwrap().x, 1.0);
//!
//! registry.destroy(e).unwrap();
//! assert!(!registry.alive(e));
//! ```

#![deny(unsafe_code)]

pub mod archetype;
#[allow(unsafe_code)]
pub mod block;
#[allow(unsafe_code)]
pub mod component;
pub mod entity;
#[allow(unsafe_code)]
pub mod registry;
#[allow(unsafe_code)]
pub mod view;

use crate::entity::Entity;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry operations.
///
/// A failed call leaves the registry unchanged.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity handle is stale or was never created.
    #[error("entity {0} not found (stale or never created)")]
    EntityNotFound(Entity),

    /// The requested component type is not part of the entity's composition.
    #[error("component '{0}' not present on the entity's archetype")]
    ComponentNotFound(&'static str),

    /// A component type appears more than once in a create pack.
    #[error("duplicate component '{0}' in create pack")]
    DuplicateComponent(&'static str),

    /// A single entity of the composition does not fit in one memory block.
    #[error("one entity of this composition needs {required} bytes, block size is {block_size}")]
    CapacityExceeded { required: usize, block_size: usize },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::block::BLOCK_SIZE;
    pub use crate::component::{
        Bundle, Component, ComponentId, ComponentMeta, ComponentMetaSet, ComponentSet,
    };
    pub use crate::entity::Entity;
    pub use crate::registry::Registry;
    pub use crate::view::{ComponentRef, Query, View, ViewMut};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
