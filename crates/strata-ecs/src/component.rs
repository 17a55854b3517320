//! Component identity, metadata, and composition sets.
//!
//! Component types are identified by a process-wide [`ComponentId`], assigned
//! the first time a type is observed and stable until the process exits.
//! Alongside the id, every component type has a [`ComponentMeta`]: its size,
//! alignment, name, and a small vtable of type-erased move/drop operations
//! that block storage uses once the concrete type is gone.
//!
//! # Safety
//!
//! The vtable function pointers in [`ComponentMeta`] are monomorphized per
//! concrete type and must only ever be invoked on pointers to values of that
//! type. The block module upholds this by keying every pointer computation on
//! the component id the meta was created with.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::{OnceLock, RwLock};

use crate::block::MemBlock;

// ---------------------------------------------------------------------------
// Component marker
// ---------------------------------------------------------------------------

/// Marker for types that can be stored as components.
///
/// Any concrete `Send + Sync + 'static` type qualifies; values flow into
/// storage by move and out by reference. Rust moves are trivial relocations,
/// so the nothrow-movability the storage relies on holds for every type.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentId + global type registry
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a component type.
///
/// Ids are assigned monotonically per process on first observation of a type
/// and never change afterwards, so compositions hash identically no matter
/// which registry instance built them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

impl std::fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// Process-global map from type name to [`ComponentId`].
struct TypeRegistry {
    by_name: HashMap<&'static str, ComponentId>,
    next_id: u32,
}

static TYPE_REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();

fn type_registry() -> &'static RwLock<TypeRegistry> {
    TYPE_REGISTRY.get_or_init(|| {
        RwLock::new(TypeRegistry {
            by_name: HashMap::new(),
            next_id: 0,
        })
    })
}

impl ComponentId {
    /// The id assigned to type `T`, registering it on first use.
    pub fn of<T: Component>() -> ComponentId {
        let name = std::any::type_name::<T>();
        {
            let registry = type_registry().read().expect("type registry poisoned");
            if let Some(&id) = registry.by_name.get(name) {
                return id;
            }
        }
        let mut registry = type_registry().write().expect("type registry poisoned");
        // Re-check: another caller may have registered between the locks.
        if let Some(&id) = registry.by_name.get(name) {
            return id;
        }
        let id = ComponentId(registry.next_id);
        registry.next_id += 1;
        registry.by_name.insert(name, id);
        id
    }
}

// ---------------------------------------------------------------------------
// ComponentMeta -- per-type metadata + type-erased operation vtable
// ---------------------------------------------------------------------------

/// Metadata for a component type: identity, layout, and the type-erased
/// operations block storage needs once the concrete type parameter is gone.
///
/// Created via [`ComponentMeta::of::<T>()`]; cheap to copy.
#[derive(Clone, Copy)]
pub struct ComponentMeta {
    /// Process-wide id of the component type.
    pub id: ComponentId,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// `std::any::type_name::<T>()`, used in error reports.
    pub name: &'static str,
    /// Relocate a value from `src` into the uninitialized slot `dst`.
    /// The source slot must not be dropped afterwards.
    pub(crate) move_construct: unsafe fn(*mut u8, *mut u8),
    /// Drop the value at `dst`, then relocate the value from `src` into it.
    /// The source slot must not be dropped afterwards.
    pub(crate) move_assign: unsafe fn(*mut u8, *mut u8),
    /// Drop the value in place.
    pub(crate) drop_fn: unsafe fn(*mut u8),
}

impl ComponentMeta {
    /// Build the metadata record for a concrete component type `T`.
    pub fn of<T: Component>() -> Self {
        unsafe fn move_construct_impl<T>(dst: *mut u8, src: *mut u8) {
            ptr::copy_nonoverlapping(src as *const T, dst as *mut T, 1);
        }

        unsafe fn move_assign_impl<T>(dst: *mut u8, src: *mut u8) {
            ptr::drop_in_place(dst as *mut T);
            ptr::copy_nonoverlapping(src as *const T, dst as *mut T, 1);
        }

        unsafe fn drop_impl<T>(slot: *mut u8) {
            ptr::drop_in_place(slot as *mut T);
        }

        Self {
            id: ComponentId::of::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            name: std::any::type_name::<T>(),
            move_construct: move_construct_impl::<T>,
            move_assign: move_assign_impl::<T>,
            drop_fn: drop_impl::<T>,
        }
    }
}

impl PartialEq for ComponentMeta {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentMeta {}

impl std::fmt::Debug for ComponentMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentSet -- trimming bitset keyed by ComponentId
// ---------------------------------------------------------------------------

/// A dynamic bitset of component ids.
///
/// The word vector is kept canonical: removing a bit trims trailing zero
/// words, so structurally equal sets are word-for-word equal and hash
/// identically. The hash is an XOR fold of the words, which is insensitive
/// to the (trimmed) word count for equal sets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ComponentSet {
    words: Vec<u64>,
}

const WORD_BITS: usize = u64::BITS as usize;

impl ComponentSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn word_and_bit(id: ComponentId) -> (usize, usize) {
        let pos = id.0 as usize;
        (pos / WORD_BITS, pos % WORD_BITS)
    }

    /// Insert a component id, growing the word vector if needed.
    pub fn insert(&mut self, id: ComponentId) {
        let (word, bit) = Self::word_and_bit(id);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << bit;
    }

    /// Remove a component id and re-canonicalize by trimming trailing zero
    /// words.
    pub fn remove(&mut self, id: ComponentId) {
        let (word, bit) = Self::word_and_bit(id);
        if word >= self.words.len() {
            return;
        }
        self.words[word] &= !(1u64 << bit);
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    /// Whether the set contains `id`.
    pub fn contains(&self, id: ComponentId) -> bool {
        let (word, bit) = Self::word_and_bit(id);
        self.words
            .get(word)
            .is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Remove every id.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Whether no id is present.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Hash for ComponentSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let folded = self.words.iter().fold(0u64, |acc, w| acc ^ w);
        state.write_u64(folded);
    }
}

impl std::fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut set = f.debug_set();
        for (word_index, word) in self.words.iter().enumerate() {
            let mut bits = *word;
            while bits != 0 {
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                set.entry(&(word_index * WORD_BITS + tz));
            }
        }
        set.finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentMetaSet -- ordered metadata list + membership bitset
// ---------------------------------------------------------------------------

/// An insertion-ordered list of [`ComponentMeta`] paired with a
/// [`ComponentSet`] for O(1) membership.
///
/// The iteration order is the order components were first inserted, and it is
/// the canonical order in which component sections are laid out inside a
/// memory block.
#[derive(Clone, Default, Debug)]
pub struct ComponentMetaSet {
    ids: ComponentSet,
    metas: Vec<ComponentMeta>,
}

impl ComponentMetaSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a component's metadata. Inserting an id twice is a no-op.
    pub fn insert(&mut self, meta: ComponentMeta) {
        if self.ids.contains(meta.id) {
            return;
        }
        self.ids.insert(meta.id);
        self.metas.push(meta);
    }

    /// Whether the set contains the component id.
    pub fn contains_id(&self, id: ComponentId) -> bool {
        self.ids.contains(id)
    }

    /// Number of component types in the set.
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Iterate metadata in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ComponentMeta> {
        self.metas.iter()
    }

    /// The membership bitset.
    pub fn ids(&self) -> &ComponentSet {
        &self.ids
    }
}

impl PartialEq for ComponentMetaSet {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for ComponentMetaSet {}

// ---------------------------------------------------------------------------
// Bundle -- a tuple of component values for Registry::create
// ---------------------------------------------------------------------------

/// A statically-typed pack of component values that can be moved into block
/// storage in one shot.
///
/// Implemented for tuples of up to 8 components; single components are
/// written as one-element tuples: `registry.create((Position { .. },))`.
pub trait Bundle {
    /// Metadata for each component in declaration order.
    fn metas() -> Vec<ComponentMeta>;

    /// Move every component value into its section of `block` at `slot`.
    ///
    /// # Safety
    ///
    /// The block's layout must contain a section for every component in this
    /// bundle, `slot` must be in bounds, and the slot must not hold live
    /// values for these components.
    unsafe fn write_into(self, block: &mut MemBlock, slot: usize);
}

macro_rules! impl_bundle_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn metas() -> Vec<ComponentMeta> {
                vec![$(ComponentMeta::of::<$name>()),+]
            }

            unsafe fn write_into(self, block: &mut MemBlock, slot: usize) {
                #[allow(non_snake_case)]
                let ($($name,)+) = self;
                $(block.write_component(slot, $name);)+
            }
        }
    };
}

impl_bundle_for_tuple!(A);
impl_bundle_for_tuple!(A, B);
impl_bundle_for_tuple!(A, B, C);
impl_bundle_for_tuple!(A, B, C, D);
impl_bundle_for_tuple!(A, B, C, D, E);
impl_bundle_for_tuple!(A, B, C, D, E, F);
impl_bundle_for_tuple!(A, B, C, D, E, F, G);
impl_bundle_for_tuple!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Pos {
        #[allow(dead_code)]
        x: f32,
    }

    struct Vel {
        #[allow(dead_code)]
        dx: f32,
    }

    #[test]
    fn same_type_same_id() {
        assert_eq!(ComponentId::of::<Pos>(), ComponentId::of::<Pos>());
    }

    #[test]
    fn different_types_different_ids() {
        assert_ne!(ComponentId::of::<Pos>(), ComponentId::of::<Vel>());
    }

    #[test]
    fn meta_reflects_type_layout() {
        let meta = ComponentMeta::of::<Pos>();
        assert_eq!(meta.size, std::mem::size_of::<Pos>());
        assert_eq!(meta.align, std::mem::align_of::<Pos>());
        assert_eq!(meta.id, ComponentId::of::<Pos>());
    }

    #[test]
    fn set_insert_contains_remove() {
        let mut set = ComponentSet::new();
        let a = ComponentId(3);
        let b = ComponentId(130);
        set.insert(a);
        set.insert(b);
        assert!(set.contains(a));
        assert!(set.contains(b));
        set.remove(b);
        assert!(!set.contains(b));
        assert!(set.contains(a));
    }

    #[test]
    fn remove_trims_to_canonical_form() {
        let mut grown = ComponentSet::new();
        grown.insert(ComponentId(2));
        grown.insert(ComponentId(200));
        grown.remove(ComponentId(200));

        let mut small = ComponentSet::new();
        small.insert(ComponentId(2));

        // Equal sets must compare and hash equal regardless of history.
        assert_eq!(grown, small);
        let hash = |s: &ComponentSet| {
            let mut h = std::collections::hash_map::DefaultHasher::new();
            s.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&grown), hash(&small));
    }

    #[test]
    fn insertion_order_independent_equality() {
        let mut ab = ComponentSet::new();
        ab.insert(ComponentId(1));
        ab.insert(ComponentId(9));
        let mut ba = ComponentSet::new();
        ba.insert(ComponentId(9));
        ba.insert(ComponentId(1));
        assert_eq!(ab, ba);
    }

    #[test]
    fn meta_set_keeps_insertion_order() {
        let mut set = ComponentMetaSet::new();
        set.insert(ComponentMeta::of::<Vel>());
        set.insert(ComponentMeta::of::<Pos>());
        set.insert(ComponentMeta::of::<Vel>()); // idempotent
        let names: Vec<&str> = set.iter().map(|m| m.name).collect();
        assert_eq!(set.len(), 2);
        assert!(names[0].contains("Vel"));
        assert!(names[1].contains("Pos"));
    }

    #[test]
    fn cleared_set_equals_fresh_set() {
        let mut set = ComponentSet::new();
        set.insert(ComponentId(64));
        set.clear();
        assert_eq!(set, ComponentSet::new());
        assert!(set.is_empty());
    }

    mod set_properties {
        use super::*;
        use proptest::prelude::*;

        fn set_hash(set: &ComponentSet) -> u64 {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            set.hash(&mut hasher);
            hasher.finish()
        }

        proptest! {
            /// Two sets built from the same ids in different orders, with
            /// arbitrary detours through extra ids, compare and hash equal.
            #[test]
            fn equality_implies_hash_equality(
                ids in prop::collection::vec(0u32..512, 0..20),
                detours in prop::collection::vec(0u32..512, 0..20),
            ) {
                let mut forward = ComponentSet::new();
                for &id in &ids {
                    forward.insert(ComponentId(id));
                }

                let mut scrambled = ComponentSet::new();
                for &id in &detours {
                    scrambled.insert(ComponentId(id));
                }
                for &id in ids.iter().rev() {
                    scrambled.insert(ComponentId(id));
                }
                for &id in &detours {
                    if !ids.contains(&id) {
                        scrambled.remove(ComponentId(id));
                    }
                }

                prop_assert_eq!(&forward, &scrambled);
                prop_assert_eq!(set_hash(&forward), set_hash(&scrambled));
            }

            /// Membership matches a reference model under random ops.
            #[test]
            fn membership_matches_model(
                ops in prop::collection::vec((0u32..512, proptest::bool::ANY), 1..40),
            ) {
                let mut set = ComponentSet::new();
                let mut model = std::collections::BTreeSet::new();
                for (id, insert) in ops {
                    if insert {
                        set.insert(ComponentId(id));
                        model.insert(id);
                    } else {
                        set.remove(ComponentId(id));
                        model.remove(&id);
                    }
                }
                for id in 0u32..512 {
                    prop_assert_eq!(set.contains(ComponentId(id)), model.contains(&id));
                }
            }
        }
    }
}
