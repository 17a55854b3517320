//! The [`Registry`] is the public façade of the ECS core. It owns the entity
//! pool, every archetype, and the map from entity index to storage location.

use std::collections::HashMap;

use crate::archetype::{ArchetypeId, ArchetypeRegistry};
use crate::component::{Bundle, Component, ComponentId};
use crate::entity::{Entity, EntityPool};
use crate::view::{self, Query, View, ViewMut};
use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype, which of its blocks, which slot.
///
/// The archetype is borrowed by id -- the archetype registry's arena never
/// moves entries, so the id is stable. A location is only meaningful until
/// the next create or destroy touching that archetype.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntityLocation {
    pub archetype: ArchetypeId,
    pub block: usize,
    pub slot: usize,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The top-level ECS container.
///
/// Entities are created with a fixed component composition and keep it for
/// their whole lifetime. All state is owned here; the registry is
/// single-threaded and every operation completes synchronously. Any
/// reference or view obtained from the registry is invalidated by the next
/// mutation -- the borrow checker enforces exactly that.
pub struct Registry {
    pub(crate) entities: EntityPool,
    pub(crate) archetypes: ArchetypeRegistry,
    pub(crate) locations: HashMap<u32, EntityLocation>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entities: EntityPool::new(),
            archetypes: ArchetypeRegistry::new(),
            locations: HashMap::new(),
        }
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity from a tuple of component values.
    ///
    /// The component types must be pairwise distinct. The archetype for the
    /// composition is created on first use; its storage layout is validated
    /// before any handle is allocated, so a failed create leaves the
    /// registry unchanged.
    ///
    /// ```
    /// # use strata_ecs::prelude::*;
    /// # struct Position { x: f32, y: f32 }
    /// # struct Velocity { dx: f32, dy: f32 }
    /// let mut registry = Registry::new();
    /// let e = registry
    ///     .create((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))
    ///     .unwrap();
    /// assert!(registry.alive(e));
    /// ```
    pub fn create<B: Bundle>(&mut self, bundle: B) -> Result<Entity, EcsError> {
        let archetype_id = self.archetypes.ensure::<B>()?;
        let entity = self.entities.create();
        let (block, slot) = self.archetypes.get_mut(archetype_id).push(entity, bundle);
        self.locations.insert(
            entity.index(),
            EntityLocation {
                archetype: archetype_id,
                block,
                slot,
            },
        );
        Ok(entity)
    }

    /// Destroy an entity, recycling its handle.
    ///
    /// The freed slot is filled by relocating the archetype's last entity;
    /// when that happens the moved entity's location is updated before this
    /// returns. Every other entity keeps its location and component values.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let location = self
            .locations
            .remove(&entity.index())
            .ok_or(EcsError::EntityNotFound(entity))?;

        let moved = self
            .archetypes
            .get_mut(location.archetype)
            .swap_erase(location.block, location.slot);

        if let Some(moved) = moved {
            if let Some(moved_location) = self.locations.get_mut(&moved.index()) {
                *moved_location = location;
            }
        }

        self.entities.recycle(entity);
        Ok(())
    }

    /// Whether `entity` is alive.
    pub fn alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    // -- component access ---------------------------------------------------

    /// Shared reference to component `T` on `entity`.
    ///
    /// The reference is valid until the next registry mutation.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        let location = self.location(entity)?;
        let block = &self.archetypes.get(location.archetype).blocks()[location.block];
        let ptr = block
            .component_ptr(ComponentId::of::<T>(), location.slot)
            .ok_or_else(|| EcsError::ComponentNotFound(std::any::type_name::<T>()))?;
        // SAFETY: the slot is live and the section stores values of `T`.
        Ok(unsafe { &*(ptr as *const T) })
    }

    /// Exclusive reference to component `T` on `entity`.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        let location = self.location(entity)?;
        let block = &self.archetypes.get(location.archetype).blocks()[location.block];
        let ptr = block
            .component_ptr_mut(ComponentId::of::<T>(), location.slot)
            .ok_or_else(|| EcsError::ComponentNotFound(std::any::type_name::<T>()))?;
        // SAFETY: the slot is live, the section stores values of `T`, and
        // the `&mut self` receiver excludes every other borrow of storage.
        Ok(unsafe { &mut *(ptr as *mut T) })
    }

    /// Fetch a tuple of shared references from one entity, e.g.
    /// `registry.fetch::<(&Position, &Velocity)>(e)`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains a mutable element; use
    /// [`fetch_mut`](Self::fetch_mut).
    pub fn fetch<Q: Query>(&self, entity: Entity) -> Result<Q::Item<'_>, EcsError> {
        assert!(
            !Q::HAS_MUTABLE,
            "Registry::fetch() cannot be used with mutable elements (&mut T); \
             use Registry::fetch_mut(), which requires &mut self"
        );
        self.fetch_impl::<Q>(entity)
    }

    /// Fetch a tuple of references, any of which may be mutable, from one
    /// entity.
    ///
    /// # Panics
    ///
    /// Panics if `Q` requests conflicting access to one component type.
    pub fn fetch_mut<Q: Query>(&mut self, entity: Entity) -> Result<Q::Item<'_>, EcsError> {
        view::validate_access(&Q::access());
        self.fetch_impl::<Q>(entity)
    }

    fn fetch_impl<Q: Query>(&self, entity: Entity) -> Result<Q::Item<'_>, EcsError> {
        let location = self.location(entity)?;
        let archetype = self.archetypes.get(location.archetype);
        for (meta, _) in Q::access() {
            if !archetype.contains_id(meta.id) {
                return Err(EcsError::ComponentNotFound(meta.name));
            }
        }
        let block = &archetype.blocks()[location.block];
        // SAFETY: every component id was checked against the composition and
        // the slot is live; mutable elements are gated by the public
        // receivers.
        Ok(unsafe { Q::fetch(block, location.slot) })
    }

    /// Whether `entity`'s composition includes component `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> Result<bool, EcsError> {
        let location = self.location(entity)?;
        Ok(self.archetypes.get(location.archetype).contains::<T>())
    }

    // -- views --------------------------------------------------------------

    /// A read-only view over every entity whose composition contains all of
    /// `Q`'s component types.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains a mutable element; use
    /// [`view_mut`](Self::view_mut).
    pub fn view<Q: Query>(&self) -> View<'_, Q> {
        assert!(
            !Q::HAS_MUTABLE,
            "Registry::view() cannot be used with mutable elements (&mut T); \
             use Registry::view_mut(), which requires &mut self"
        );
        View::new(self)
    }

    /// A view with mutable elements over every matching entity.
    ///
    /// # Panics
    ///
    /// Panics if `Q` requests conflicting access to one component type.
    pub fn view_mut<Q: Query>(&mut self) -> ViewMut<'_, Q> {
        view::validate_access(&Q::access());
        ViewMut::new(self)
    }

    /// Invoke `f` once per entity matching `Q` with a shared reference
    /// tuple: `registry.each::<(&Position,)>(|(pos,)| ...)`.
    pub fn each<'a, Q: Query>(&'a self, f: impl FnMut(Q::Item<'a>)) {
        self.view::<Q>().each(f);
    }

    /// Invoke `f` once per entity matching `Q`, allowing mutable elements.
    pub fn each_mut<'a, Q: Query>(&'a mut self, f: impl FnMut(Q::Item<'a>)) {
        self.view_mut::<Q>().each(f);
    }

    // -- introspection ------------------------------------------------------

    /// Number of alive entities.
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of distinct archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- internals ----------------------------------------------------------

    fn ensure_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::EntityNotFound(entity))
        }
    }

    fn location(&self, entity: Entity) -> Result<EntityLocation, EcsError> {
        self.ensure_alive(entity)?;
        self.locations
            .get(&entity.index())
            .copied()
            .ok_or(EcsError::EntityNotFound(entity))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entity_count", &self.entity_count())
            .field("archetype_count", &self.archetype_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
