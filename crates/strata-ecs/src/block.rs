//! Fixed-size SoA block storage.
//!
//! A [`MemBlock`] is one 16 KiB buffer holding the packed arrays of a single
//! archetype: first an array of [`Entity`] handles, then one array per
//! component type in the archetype's canonical order, each preceded by the
//! padding its alignment requires:
//!
//! ```text
//! |E1|E2|E3|..pad..|A1|A2|A3|..pad..|B1|B2|B3| ...
//! ```
//!
//! All blocks of an archetype share one immutable [`BlockLayout`] describing
//! the section offsets, so a slot address is always
//! `buffer + section_offset + slot * size`.
//!
//! # Safety
//!
//! This module manages raw, type-erased memory. The invariants are local:
//! every slot below `len` holds live values in every section, section
//! pointers are only produced for ids present in the layout, and the vtable
//! in each section's [`ComponentMeta`] matches the bytes stored there.

use std::alloc::{self, Layout};
use std::sync::Arc;

use crate::component::{Bundle, ComponentId, ComponentMeta, ComponentMetaSet};
use crate::entity::Entity;
use crate::EcsError;

/// Byte size of every memory block.
pub const BLOCK_SIZE: usize = 16 * 1024;

/// Base address alignment assumed by the capacity computation.
pub const ALLOC_ALIGNMENT: usize = std::mem::align_of::<Entity>();

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// BlockLayout
// ---------------------------------------------------------------------------

/// One section of a block: where a component array starts and how to operate
/// on its elements.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LayoutEntry {
    pub offset: usize,
    pub meta: ComponentMeta,
}

/// The section table shared by every block of one archetype.
///
/// Entries are ordered: the entity section first, then each component in
/// meta-set order. Built once per archetype and shared immutably via `Arc`.
#[derive(Debug)]
pub(crate) struct BlockLayout {
    entries: Vec<LayoutEntry>,
    entity_id: ComponentId,
    max_size: usize,
    buffer_layout: Layout,
}

impl BlockLayout {
    /// Compute the per-block capacity and section offsets for a composition.
    ///
    /// The capacity follows from the footprint of one fully aligned slot
    /// walked from [`ALLOC_ALIGNMENT`]: the first slot absorbs all
    /// inter-array padding, every further slot packs tightly inside each
    /// array. If even one slot does not fit the block, the composition is
    /// unrepresentable and [`EcsError::CapacityExceeded`] is returned.
    pub fn new(components: &ComponentMetaSet) -> Result<Self, EcsError> {
        let entity_meta = ComponentMeta::of::<Entity>();
        debug_assert!(
            !components.contains_id(entity_meta.id),
            "the entity section is implicit and must not appear in the meta set"
        );

        let mut sections = Vec::with_capacity(components.len() + 1);
        sections.push(entity_meta);
        sections.extend(components.iter().copied());

        let mut end = ALLOC_ALIGNMENT;
        for meta in &sections {
            end = align_up(end, meta.align);
            end += meta.size;
        }
        let aligned_size = end - ALLOC_ALIGNMENT;
        if aligned_size > BLOCK_SIZE {
            return Err(EcsError::CapacityExceeded {
                required: aligned_size,
                block_size: BLOCK_SIZE,
            });
        }

        let per_slot: usize = sections.iter().map(|m| m.size).sum();
        let mut max_size = (BLOCK_SIZE - aligned_size) / per_slot + 1;

        // The closed form can overshoot by a slot when array padding lands
        // worse than the single-slot walk; shrink until the arrays fit.
        let entries = loop {
            let mut entries = Vec::with_capacity(sections.len());
            let mut cursor = 0usize;
            for meta in &sections {
                let offset = align_up(cursor, meta.align);
                entries.push(LayoutEntry {
                    offset,
                    meta: *meta,
                });
                cursor = offset + max_size * meta.size;
            }
            if cursor <= BLOCK_SIZE {
                break entries;
            }
            max_size -= 1;
            if max_size == 0 {
                return Err(EcsError::CapacityExceeded {
                    required: cursor,
                    block_size: BLOCK_SIZE,
                });
            }
        };

        let buffer_align = sections
            .iter()
            .map(|m| m.align)
            .max()
            .unwrap_or(ALLOC_ALIGNMENT)
            .max(ALLOC_ALIGNMENT);
        let buffer_layout =
            Layout::from_size_align(BLOCK_SIZE, buffer_align).expect("invalid block layout");

        Ok(Self {
            entries,
            entity_id: entity_meta.id,
            max_size,
            buffer_layout,
        })
    }

    /// Entities a block of this layout can hold.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The id under which the entity section is recorded.
    #[inline]
    pub fn entity_id(&self) -> ComponentId {
        self.entity_id
    }

    /// All sections, entity first.
    #[inline]
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Find the section for a component id.
    #[inline]
    pub fn entry(&self, id: ComponentId) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.meta.id == id)
    }

    #[inline]
    fn entity_entry(&self) -> &LayoutEntry {
        &self.entries[0]
    }
}

// ---------------------------------------------------------------------------
// MemBlock
// ---------------------------------------------------------------------------

/// A fixed-size buffer holding one archetype's packed SoA arrays.
///
/// Slots `[0, len)` are live in every section; slot `len - 1` is always the
/// last live entry. Blocks cannot be cloned; dropping a block destroys every
/// live component value and frees the buffer.
pub struct MemBlock {
    data: *mut u8,
    len: usize,
    layout: Arc<BlockLayout>,
}

// The buffer only ever stores `Entity` and component values, and every
// component type is bounded `Send + Sync`. The raw pointer is an ownership
// detail, not shared state.
unsafe impl Send for MemBlock {}
unsafe impl Sync for MemBlock {}

impl MemBlock {
    /// Allocate an empty block for the given layout.
    pub(crate) fn new(layout: Arc<BlockLayout>) -> Self {
        let buffer_layout = layout.buffer_layout;
        // SAFETY: BLOCK_SIZE is non-zero and the alignment is a power of two.
        let data = unsafe { alloc::alloc(buffer_layout) };
        if data.is_null() {
            alloc::handle_alloc_error(buffer_layout);
        }
        tracing::trace!(max_size = layout.max_size, "allocated memory block");
        Self {
            data,
            len: 0,
            layout,
        }
    }

    /// Number of live slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.layout.max_size
    }

    /// Capacity in entities.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.layout.max_size
    }

    #[inline]
    fn section_ptr(&self, entry: &LayoutEntry, slot: usize) -> *mut u8 {
        // SAFETY: offsets and max_size are computed so that every section
        // slot lies inside the BLOCK_SIZE allocation.
        unsafe { self.data.add(entry.offset + slot * entry.meta.size) }
    }

    /// The entity stored at `slot`.
    #[inline]
    pub fn entity_at(&self, slot: usize) -> Entity {
        debug_assert!(slot < self.len);
        let entry = self.layout.entity_entry();
        // SAFETY: slot is live, and the entity section holds initialized
        // `Entity` values for every live slot.
        unsafe { *(self.section_ptr(entry, slot) as *const Entity) }
    }

    /// Raw pointer to the value of component `id` at `slot`, if the section
    /// exists. Serves the entity section as well (read-only use).
    #[inline]
    pub(crate) fn component_ptr(&self, id: ComponentId, slot: usize) -> Option<*mut u8> {
        let entry = self.layout.entry(id)?;
        debug_assert!(slot < self.len);
        Some(self.section_ptr(entry, slot))
    }

    /// Like [`component_ptr`](Self::component_ptr), but refuses the entity
    /// section: entity identity is registry-controlled and never handed out
    /// mutably.
    #[inline]
    pub(crate) fn component_ptr_mut(&self, id: ComponentId, slot: usize) -> Option<*mut u8> {
        if id == self.layout.entity_id {
            return None;
        }
        self.component_ptr(id, slot)
    }

    /// Move one component value into its section at `slot`.
    ///
    /// # Safety
    ///
    /// `slot` must be inside the allocation and must not already hold a live
    /// value for this component. The layout must contain `T`'s section.
    pub(crate) unsafe fn write_component<T: crate::component::Component>(
        &mut self,
        slot: usize,
        value: T,
    ) {
        let entry = self
            .layout
            .entry(ComponentId::of::<T>())
            .expect("component type not in block layout");
        debug_assert_eq!(entry.meta.size, std::mem::size_of::<T>());
        std::ptr::write(self.section_ptr(entry, slot) as *mut T, value);
    }

    /// Append an entity and its component values.
    ///
    /// Precondition: the block is not full. The bundle's component set must
    /// exactly match the layout's component sections.
    pub(crate) fn push<B: Bundle>(&mut self, entity: Entity, bundle: B) -> usize {
        debug_assert!(!self.is_full(), "memory block is full");
        let slot = self.len;
        // SAFETY: slot is below max_size and holds no live values yet.
        unsafe {
            let entry = self.layout.entity_entry();
            std::ptr::write(self.section_ptr(entry, slot) as *mut Entity, entity);
            bundle.write_into(self, slot);
        }
        self.len = slot + 1;
        slot
    }

    /// Erase `slot`, filling the hole with this block's own last entry.
    ///
    /// Returns the handle of the entity that moved into `slot`, or `None`
    /// when `slot` was the last entry and nothing had to move.
    pub(crate) fn swap_erase(&mut self, slot: usize) -> Option<Entity> {
        debug_assert!(slot < self.len);
        let last = self.len - 1;
        if slot == last {
            self.destroy_last();
            return None;
        }
        let moved = self.entity_at(last);
        // SAFETY: both slots are live; move_assign drops the hole's old
        // value and relocates the last slot's bytes. The vacated last slot
        // is released without dropping.
        unsafe {
            for entry in self.layout.entries() {
                let dst = self.section_ptr(entry, slot);
                let src = self.section_ptr(entry, last);
                (entry.meta.move_assign)(dst, src);
            }
        }
        self.len = last;
        Some(moved)
    }

    /// Erase `slot`, filling the hole with the last entry of `source` (the
    /// archetype's current last block).
    ///
    /// Returns the handle of the entity moved into `slot`.
    pub(crate) fn swap_erase_from(&mut self, slot: usize, source: &mut MemBlock) -> Option<Entity> {
        debug_assert!(slot < self.len);
        debug_assert!(!source.is_empty(), "source block has no entity to move");
        let src_slot = source.len - 1;
        let moved = source.entity_at(src_slot);
        // SAFETY: both blocks share the same layout; the hole's old values
        // are dropped by move_assign, the source's vacated slot is released
        // without dropping.
        unsafe {
            for entry in self.layout.entries() {
                let dst = self.section_ptr(entry, slot);
                let src = source.section_ptr(entry, src_slot);
                (entry.meta.move_assign)(dst, src);
            }
        }
        source.len = src_slot;
        Some(moved)
    }

    /// Destroy the values in the last live slot and shrink by one.
    pub(crate) fn destroy_last(&mut self) {
        debug_assert!(!self.is_empty(), "memory block is empty");
        let last = self.len - 1;
        // SAFETY: the slot is live in every section.
        unsafe {
            for entry in self.layout.entries() {
                (entry.meta.drop_fn)(self.section_ptr(entry, last));
            }
        }
        self.len = last;
    }
}

impl Drop for MemBlock {
    fn drop(&mut self) {
        // SAFETY: slots [0, len) are live in every section; after dropping
        // them the buffer is released with the layout it was allocated with.
        unsafe {
            for entry in self.layout.entries() {
                for slot in 0..self.len {
                    (entry.meta.drop_fn)(self.section_ptr(entry, slot));
                }
            }
            alloc::dealloc(self.data, self.layout.buffer_layout);
        }
    }
}

impl std::fmt::Debug for MemBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemBlock")
            .field("len", &self.len)
            .field("max_size", &self.layout.max_size)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
