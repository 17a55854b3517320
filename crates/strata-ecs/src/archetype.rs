//! Archetype storage and the archetype registry.
//!
//! An [`Archetype`] owns the block list for one component composition. All
//! blocks except possibly the last are full; the last block is the only one
//! that receives new entities, and the only block an erase ever shrinks: a
//! hole anywhere in the archetype is filled by relocating the last block's
//! last entry, so at most one entity changes location per erase.

use std::collections::HashMap;
use std::sync::Arc;

use crate::block::{BlockLayout, MemBlock};
use crate::component::{Bundle, ComponentId, ComponentMetaSet, ComponentSet};
use crate::entity::Entity;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within a registry. Indexes into the archetype
/// registry's arena, which never relocates or removes entries, so the id
/// stays valid for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub(crate) u32);

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// Storage for all entities sharing one component composition.
pub struct Archetype {
    components: ComponentMetaSet,
    layout: Arc<BlockLayout>,
    blocks: Vec<MemBlock>,
}

impl Archetype {
    /// Build storage for a composition, computing the shared block layout.
    ///
    /// Fails with [`EcsError::CapacityExceeded`] when a single entity of this
    /// composition does not fit in one block.
    pub(crate) fn new(components: ComponentMetaSet) -> Result<Self, EcsError> {
        let layout = Arc::new(BlockLayout::new(&components)?);
        let blocks = vec![MemBlock::new(layout.clone())];
        Ok(Self {
            components,
            layout,
            blocks,
        })
    }

    /// The composition stored here.
    pub fn components(&self) -> &ComponentMetaSet {
        &self.components
    }

    /// Entities one block can hold.
    pub fn max_size(&self) -> usize {
        self.layout.max_size()
    }

    /// Total number of entities across all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(MemBlock::len).sum()
    }

    /// Whether the archetype holds no entities.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(MemBlock::is_empty)
    }

    /// Whether component type `T` is part of this composition. The entity
    /// pseudo-component is always present.
    pub fn contains<T: crate::component::Component>(&self) -> bool {
        self.contains_id(ComponentId::of::<T>())
    }

    /// Id-keyed variant of [`contains`](Self::contains).
    pub fn contains_id(&self, id: ComponentId) -> bool {
        id == self.layout.entity_id() || self.components.contains_id(id)
    }

    /// Ordered access to the blocks.
    pub(crate) fn blocks(&self) -> &[MemBlock] {
        &self.blocks
    }

    /// Append an entity, allocating a fresh block when the last one is full.
    ///
    /// Returns the `(block_index, slot)` the entity landed in.
    pub(crate) fn push<B: Bundle>(&mut self, entity: Entity, bundle: B) -> (usize, usize) {
        let last = self.blocks.len() - 1;
        if self.blocks[last].is_full() {
            self.blocks.push(MemBlock::new(self.layout.clone()));
        }
        let block_index = self.blocks.len() - 1;
        let slot = self.blocks[block_index].push(entity, bundle);
        (block_index, slot)
    }

    /// Erase the entity at `(block_index, slot)`, filling the hole from the
    /// archetype's last block and popping that block if it empties while
    /// other blocks remain.
    ///
    /// Returns the handle of the entity that moved into the hole, if any.
    pub(crate) fn swap_erase(&mut self, block_index: usize, slot: usize) -> Option<Entity> {
        debug_assert!(block_index < self.blocks.len());
        let last = self.blocks.len() - 1;
        let moved = if block_index == last {
            self.blocks[last].swap_erase(slot)
        } else {
            let (head, tail) = self.blocks.split_at_mut(last);
            head[block_index].swap_erase_from(slot, &mut tail[0])
        };
        if self.blocks[last].is_empty() && self.blocks.len() > 1 {
            self.blocks.pop();
        }
        moved
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("components", &self.components)
            .field("max_size", &self.max_size())
            .field("blocks", &self.blocks.len())
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ArchetypeRegistry
// ---------------------------------------------------------------------------

/// Owns every archetype, keyed by component composition.
///
/// Archetypes live in an arena indexed by [`ArchetypeId`]; entries are never
/// removed or reordered, which is what lets entity locations borrow an
/// archetype by id instead of by pointer.
#[derive(Default)]
pub(crate) struct ArchetypeRegistry {
    archetypes: Vec<Archetype>,
    by_set: HashMap<ComponentSet, ArchetypeId>,
    /// Scratch set reused across lookups to avoid re-allocating per call.
    scratch: ComponentSet,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the archetype for bundle `B`'s composition.
    ///
    /// Fails with [`EcsError::DuplicateComponent`] when a component type
    /// appears twice in the bundle (the entity pseudo-component counts as
    /// already present), and propagates layout failures from archetype
    /// construction.
    pub fn ensure<B: Bundle>(&mut self) -> Result<ArchetypeId, EcsError> {
        let metas = B::metas();
        let entity_id = ComponentId::of::<Entity>();

        self.scratch.clear();
        for meta in &metas {
            if meta.id == entity_id || self.scratch.contains(meta.id) {
                return Err(EcsError::DuplicateComponent(meta.name));
            }
            self.scratch.insert(meta.id);
        }

        if let Some(&id) = self.by_set.get(&self.scratch) {
            return Ok(id);
        }

        let mut components = ComponentMetaSet::new();
        for meta in metas {
            components.insert(meta);
        }
        let archetype = Archetype::new(components)?;
        tracing::debug!(
            components = ?archetype.components(),
            max_size = archetype.max_size(),
            "built archetype"
        );

        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes.push(archetype);
        self.by_set.insert(self.scratch.clone(), id);
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.0 as usize]
    }

    /// Iterate `(id, archetype)` pairs. The order is unspecified to callers
    /// but stable between mutations.
    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeId, &Archetype)> {
        self.archetypes
            .iter()
            .enumerate()
            .map(|(i, a)| (ArchetypeId(i as u32), a))
    }

    /// Number of distinct archetypes.
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentMeta;

    #[derive(Debug, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, PartialEq)]
    struct Tag(u32);

    fn archetype_of(metas: &[ComponentMeta]) -> Archetype {
        let mut set = ComponentMetaSet::new();
        for meta in metas {
            set.insert(*meta);
        }
        Archetype::new(set).unwrap()
    }

    #[test]
    fn contains_reports_composition_and_entity() {
        let arch = archetype_of(&[ComponentMeta::of::<Pos>()]);
        assert!(arch.contains::<Pos>());
        assert!(arch.contains::<Entity>());
        assert!(!arch.contains::<Tag>());
    }

    #[test]
    fn push_grows_into_second_block_when_full() {
        let mut arch = archetype_of(&[ComponentMeta::of::<Pos>()]);
        let cap = arch.max_size();
        for i in 0..=cap {
            arch.push(Entity::new(i as u32, 0), (Pos { x: 0.0, y: 0.0 },));
        }
        assert_eq!(arch.blocks().len(), 2);
        assert_eq!(arch.blocks()[0].len(), cap);
        assert_eq!(arch.blocks()[1].len(), 1);
        assert_eq!(arch.len(), cap + 1);
    }

    #[test]
    fn erase_in_full_block_pulls_from_last_block() {
        let mut arch = archetype_of(&[ComponentMeta::of::<Tag>()]);
        let cap = arch.max_size();
        for i in 0..=cap {
            arch.push(Entity::new(i as u32, 0), (Tag(i as u32),));
        }
        // Hole in block 0 is filled by the only entity of block 1, which
        // empties and is popped.
        let moved = arch.swap_erase(0, 0);
        assert_eq!(moved, Some(Entity::new(cap as u32, 0)));
        assert_eq!(arch.blocks().len(), 1);
        assert_eq!(arch.len(), cap);
        assert_eq!(arch.blocks()[0].entity_at(0), Entity::new(cap as u32, 0));
    }

    #[test]
    fn last_block_is_never_popped_when_it_is_the_only_one() {
        let mut arch = archetype_of(&[ComponentMeta::of::<Tag>()]);
        arch.push(Entity::new(0, 0), (Tag(0),));
        assert_eq!(arch.swap_erase(0, 0), None);
        assert_eq!(arch.blocks().len(), 1);
        assert!(arch.is_empty());
    }

    #[test]
    fn ensure_reuses_archetype_across_type_order() {
        let mut registry = ArchetypeRegistry::new();
        let ab = registry.ensure::<(Pos, Tag)>().unwrap();
        let ba = registry.ensure::<(Tag, Pos)>().unwrap();
        assert_eq!(ab, ba);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ensure_rejects_duplicate_component() {
        let mut registry = ArchetypeRegistry::new();
        let err = registry.ensure::<(Pos, Pos)>().unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent(_)));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn ensure_rejects_entity_in_bundle() {
        let mut registry = ArchetypeRegistry::new();
        let err = registry.ensure::<(Entity,)>().unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent(_)));
    }
}
