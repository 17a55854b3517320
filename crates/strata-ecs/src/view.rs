//! Typed views over block storage.
//!
//! A [`View`] is a lazy query over every archetype whose composition is a
//! superset of a requested tuple of component references. Iteration yields
//! one reference tuple per live entity, walking matching archetypes in
//! registry order, their blocks in insertion order, and slots ascending.
//!
//! ## Soundness
//!
//! Read-only views (`&T` elements) are obtained from [`Registry::view`],
//! which takes `&self`. Mutable views (`&mut T` elements) are obtained from
//! [`Registry::view_mut`], which takes `&mut self` and thereby guarantees
//! exclusive access to all storage for the view's lifetime; a mutable view
//! can be iterated only once. Any registry mutation invalidates outstanding
//! views at compile time through the borrow it holds.

use std::marker::PhantomData;

use crate::archetype::ArchetypeId;
use crate::block::MemBlock;
use crate::component::{Component, ComponentId, ComponentMeta};
use crate::entity::Entity;
use crate::registry::Registry;

// ---------------------------------------------------------------------------
// ComponentRef -- one element of a view tuple
// ---------------------------------------------------------------------------

/// One element of a view or fetch tuple: `&T` (shared) or `&mut T`
/// (exclusive).
///
/// `&Entity` is a valid shared element -- the entity array is a read-only
/// section of every block. `&mut Entity` is rejected at validation time.
pub trait ComponentRef {
    /// The reference type yielded per slot.
    type Item<'w>;
    /// Whether this element borrows mutably.
    const MUTABLE: bool;
    /// Metadata of the referenced component type.
    fn meta() -> ComponentMeta;
    /// Produce one reference from a block slot.
    ///
    /// # Safety
    ///
    /// `slot` must be live and the component must be present in the block's
    /// layout. For mutable elements the caller must hold exclusive registry
    /// access and must not produce two references to the same slot.
    unsafe fn fetch(block: &MemBlock, slot: usize) -> Self::Item<'_>;
}

impl<T: Component> ComponentRef for &T {
    type Item<'w> = &'w T;
    const MUTABLE: bool = false;

    fn meta() -> ComponentMeta {
        ComponentMeta::of::<T>()
    }

    unsafe fn fetch(block: &MemBlock, slot: usize) -> Self::Item<'_> {
        let ptr = block
            .component_ptr(ComponentId::of::<T>(), slot)
            .expect("component missing from matched block");
        &*(ptr as *const T)
    }
}

// Mutable fetch derives a `&mut T` from a shared block reference. This is
// sound because mutable views and fetches are only constructed behind a
// `&mut Registry` receiver, which excludes every other borrow of storage.
impl<T: Component> ComponentRef for &mut T {
    type Item<'w> = &'w mut T;
    const MUTABLE: bool = true;

    fn meta() -> ComponentMeta {
        ComponentMeta::of::<T>()
    }

    unsafe fn fetch(block: &MemBlock, slot: usize) -> Self::Item<'_> {
        let ptr = block
            .component_ptr_mut(ComponentId::of::<T>(), slot)
            .expect("component missing from matched block");
        &mut *(ptr as *mut T)
    }
}

// ---------------------------------------------------------------------------
// Query -- a tuple of ComponentRefs
// ---------------------------------------------------------------------------

/// A tuple of [`ComponentRef`]s: `(&A, &B)`, `(&mut A, &B)`, ...
///
/// Implemented for tuples of up to 8 elements.
pub trait Query {
    /// The reference tuple yielded per entity.
    type Item<'w>;
    /// Whether any element borrows mutably.
    const HAS_MUTABLE: bool;
    /// `(meta, mutable)` for every element, in tuple order.
    fn access() -> Vec<(ComponentMeta, bool)>;
    /// Fetch one tuple from a block slot.
    ///
    /// # Safety
    ///
    /// See [`ComponentRef::fetch`]; applies to every element.
    unsafe fn fetch(block: &MemBlock, slot: usize) -> Self::Item<'_>;
}

macro_rules! impl_query_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: ComponentRef),+> Query for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);
            const HAS_MUTABLE: bool = false $(|| $name::MUTABLE)+;

            fn access() -> Vec<(ComponentMeta, bool)> {
                vec![$(($name::meta(), $name::MUTABLE)),+]
            }

            unsafe fn fetch(block: &MemBlock, slot: usize) -> Self::Item<'_> {
                ($($name::fetch(block, slot),)+)
            }
        }
    };
}

impl_query_for_tuple!(A);
impl_query_for_tuple!(A, B);
impl_query_for_tuple!(A, B, C);
impl_query_for_tuple!(A, B, C, D);
impl_query_for_tuple!(A, B, C, D, E);
impl_query_for_tuple!(A, B, C, D, E, F);
impl_query_for_tuple!(A, B, C, D, E, F, G);
impl_query_for_tuple!(A, B, C, D, E, F, G, H);

/// Reject tuples that could alias: the same component type with any mutable
/// access, or a mutable borrow of the entity handle.
///
/// # Panics
///
/// These are programmer errors in the query type itself, so they panic
/// rather than surface as recoverable failures.
pub(crate) fn validate_access(access: &[(ComponentMeta, bool)]) {
    let entity_id = ComponentId::of::<Entity>();
    for (i, &(meta, mutable)) in access.iter().enumerate() {
        if mutable && meta.id == entity_id {
            panic!("views cannot access the entity handle mutably");
        }
        for &(earlier, earlier_mutable) in &access[..i] {
            if earlier.id == meta.id && (mutable || earlier_mutable) {
                panic!(
                    "view has conflicting access to component '{}'",
                    meta.name
                );
            }
        }
    }
}

/// Archetypes whose composition is a superset of the query's component set.
pub(crate) fn matching_archetypes<Q: Query>(registry: &Registry) -> Vec<ArchetypeId> {
    let ids: Vec<ComponentId> = Q::access().iter().map(|(meta, _)| meta.id).collect();
    registry
        .archetypes
        .iter()
        .filter(|(_, archetype)| ids.iter().all(|&id| archetype.contains_id(id)))
        .map(|(id, _)| id)
        .collect()
}

// ---------------------------------------------------------------------------
// View (shared)
// ---------------------------------------------------------------------------

/// A lazy read-only query over all matching archetypes.
pub struct View<'w, Q: Query> {
    registry: &'w Registry,
    matched: Vec<ArchetypeId>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> View<'w, Q> {
    pub(crate) fn new(registry: &'w Registry) -> Self {
        let matched = matching_archetypes::<Q>(registry);
        Self {
            registry,
            matched,
            _marker: PhantomData,
        }
    }

    /// Number of entities the view covers, without fetching any of them.
    pub fn size(&self) -> usize {
        self.matched
            .iter()
            .map(|&id| self.registry.archetypes.get(id).len())
            .sum()
    }

    /// Iterate all matching reference tuples.
    pub fn iter(&self) -> ViewIter<'w, Q> {
        ViewIter::new(self.registry, self.matched.clone())
    }

    /// Invoke `f` once per matching entity.
    pub fn each(&self, mut f: impl FnMut(Q::Item<'w>)) {
        for item in self.iter() {
            f(item);
        }
    }
}

impl<'w, Q: Query> IntoIterator for &View<'w, Q> {
    type Item = Q::Item<'w>;
    type IntoIter = ViewIter<'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// ViewMut (exclusive)
// ---------------------------------------------------------------------------

/// A lazy query over all matching archetypes with at least shared access and
/// optionally mutable elements.
///
/// Constructed from `&mut Registry`; consuming iteration keeps mutable
/// aliasing impossible -- each entity's tuple is produced exactly once.
pub struct ViewMut<'w, Q: Query> {
    registry: &'w Registry,
    matched: Vec<ArchetypeId>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> ViewMut<'w, Q> {
    pub(crate) fn new(registry: &'w mut Registry) -> Self {
        let shared: &'w Registry = registry;
        let matched = matching_archetypes::<Q>(shared);
        Self {
            registry: shared,
            matched,
            _marker: PhantomData,
        }
    }

    /// Number of entities the view covers.
    pub fn size(&self) -> usize {
        self.matched
            .iter()
            .map(|&id| self.registry.archetypes.get(id).len())
            .sum()
    }

    /// Iterate all matching reference tuples. Consumes the view.
    pub fn iter(self) -> ViewIter<'w, Q> {
        ViewIter::new(self.registry, self.matched)
    }

    /// Invoke `f` once per matching entity. Consumes the view.
    pub fn each(self, mut f: impl FnMut(Q::Item<'w>)) {
        for item in self.iter() {
            f(item);
        }
    }
}

impl<'w, Q: Query> IntoIterator for ViewMut<'w, Q> {
    type Item = Q::Item<'w>;
    type IntoIter = ViewIter<'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// ViewIter
// ---------------------------------------------------------------------------

/// Iterator behind [`View`] and [`ViewMut`]: archetype-major, block order,
/// slot-ascending.
pub struct ViewIter<'w, Q: Query> {
    registry: &'w Registry,
    matched: Vec<ArchetypeId>,
    archetype_cursor: usize,
    block_cursor: usize,
    slot_cursor: usize,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> ViewIter<'w, Q> {
    fn new(registry: &'w Registry, matched: Vec<ArchetypeId>) -> Self {
        Self {
            registry,
            matched,
            archetype_cursor: 0,
            block_cursor: 0,
            slot_cursor: 0,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for ViewIter<'w, Q> {
    type Item = Q::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        let registry: &'w Registry = self.registry;
        loop {
            let &archetype_id = self.matched.get(self.archetype_cursor)?;
            let blocks = registry.archetypes.get(archetype_id).blocks();
            match blocks.get(self.block_cursor) {
                Some(block) if self.slot_cursor < block.len() => {
                    // SAFETY: the archetype matched every component id, the
                    // slot is live, and exclusivity for mutable elements is
                    // guaranteed by the view construction receiver.
                    let item = unsafe { Q::fetch(block, self.slot_cursor) };
                    self.slot_cursor += 1;
                    return Some(item);
                }
                Some(_) => {
                    self.block_cursor += 1;
                    self.slot_cursor = 0;
                }
                None => {
                    self.archetype_cursor += 1;
                    self.block_cursor = 0;
                    self.slot_cursor = 0;
                }
            }
        }
    }
}
