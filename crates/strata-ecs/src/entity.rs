//! Entity handles and allocation.
//!
//! An [`Entity`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. The generation is bumped
//! every time an index is recycled, which allows immediate stale-handle
//! detection.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// The reserved invalid handle: maximum index and maximum generation.
    pub const INVALID: Entity = Entity::new(u32::MAX, u32::MAX);

    /// Construct an `Entity` from an index and generation.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether this handle is anything other than [`Entity::INVALID`].
    ///
    /// A valid handle is not necessarily alive; aliveness is decided by the
    /// registry that issued it.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != Entity::INVALID.0
    }

    /// Raw `u64` representation.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::INVALID
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityPool
// ---------------------------------------------------------------------------

/// Allocates and recycles [`Entity`] handles with generational tracking.
///
/// Free indices are kept on a LIFO stack so that the most recently recycled
/// index is handed out first, keeping hot entities clustered in storage.
///
/// Invariant: for every index on the free stack, `generations[index]` already
/// holds the *next* generation, one past any stale handle for that index.
#[derive(Debug, Default)]
pub struct EntityPool {
    /// Current generation for each index slot.
    generations: Vec<u32>,
    /// Free-list of recyclable indices (LIFO stack).
    free_ids: Vec<u32>,
}

impl EntityPool {
    /// Create a new, empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`Entity`].
    ///
    /// Reuses the most recently recycled index if one is available (its
    /// generation was already bumped on recycle); otherwise a brand-new index
    /// is created at generation 0.
    pub fn create(&mut self) -> Entity {
        if let Some(index) = self.free_ids.pop() {
            Entity::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            Entity::new(index, 0)
        }
    }

    /// Returns `true` if `entity` matches the current generation for its
    /// index.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        idx < self.generations.len() && self.generations[idx] == entity.generation()
    }

    /// Recycle an entity handle, making its index available to the next
    /// [`create`](Self::create) and invalidating all outstanding copies.
    ///
    /// A handle that is not alive is ignored.
    pub fn recycle(&mut self, entity: Entity) {
        if !self.is_alive(entity) {
            return;
        }
        let idx = entity.index() as usize;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_ids.push(entity.index());
    }

    /// Number of index slots ever allocated (alive or recycled).
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
