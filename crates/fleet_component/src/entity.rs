//! Entity identifiers.
//!
//! Browsers receive IDs as `f32`, so the ID space stops at [`Entity::MAX`],
//! the largest integer an `f32` holds exactly.

use serde::{Deserialize, Serialize};

/// Names one simulated instance for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u32);

impl Entity {
    /// Highest ID the allocator hands out.
    pub const MAX: Entity = Entity(1 << f32::MANTISSA_DIGITS);

    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Hands out IDs `1..=Entity::MAX` in order. IDs are never recycled, so a
/// client may keep using an ID as a stable key after its entity dies.
#[derive(Debug)]
pub struct EntityAllocator {
    next: u32,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// The next unused ID, or `None` once [`Entity::MAX`] has been handed out.
    pub fn allocate(&mut self) -> Option<Entity> {
        if self.next > Entity::MAX.0 {
            return None;
        }
        let entity = Entity(self.next);
        self.next += 1;
        Some(entity)
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut allocator = EntityAllocator::new();
        let ids: Vec<u32> = (0..3).filter_map(|_| allocator.allocate()).map(Entity::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_allocation_stops_at_max() {
        let mut allocator = EntityAllocator {
            next: Entity::MAX.id() - 1,
        };
        assert_eq!(allocator.allocate(), Some(Entity::from_raw(Entity::MAX.id() - 1)));
        assert_eq!(allocator.allocate(), Some(Entity::MAX));
        assert_eq!(allocator.allocate(), None);
    }

    #[test]
    fn test_max_is_exact_as_f32() {
        let max = Entity::MAX.id();
        assert_eq!(max as f32 as u32, max);
        assert_ne!((max + 1) as f32 as u32, max + 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Entity::from_raw(12).to_string(), "Entity(12)");
    }
}
