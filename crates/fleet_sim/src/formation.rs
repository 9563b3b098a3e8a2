//! Formation patterns for cluster members.
//!
//! A [`Pattern`] lays out `count` slots around the origin. Members are
//! assigned slots in entity-ID order, and each steers towards
//! `anchor + slot - drift`, where the drift is the centre of mass of the
//! assigned slots. The formation is therefore centred on the anchor.

use std::f32::consts::PI;

use fleet_component::Entity;
use fleet_math::Vec3;

/// Groups up to this size form a ring; larger groups form a grid.
pub const MAX_CIRCULAR_SLOTS: usize = 8;

/// Distance between neighbouring slots, as a multiple of the largest
/// member's size.
pub const SLOT_SPACING_SCALE: f32 = 1.5;

/// Slot layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pattern {
    /// Slots evenly spaced on a ring, `spacing` apart along the chords.
    Circular { count: usize, spacing: f32 },
    /// Row-major square grid.
    Grid { count: usize, spacing: f32 },
}

/// A member bound to a slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAssignment {
    pub entity: Entity,
    pub slot: usize,
}

impl Pattern {
    /// The pattern used for a group of `count` members.
    #[must_use]
    pub fn for_group(count: usize, spacing: f32) -> Self {
        if (2..=MAX_CIRCULAR_SLOTS).contains(&count) {
            Self::Circular { count, spacing }
        } else {
            Self::Grid { count, spacing }
        }
    }

    /// Whether this pattern can hold `n` members.
    #[must_use]
    pub fn supports_slots(&self, n: usize) -> bool {
        match *self {
            Self::Circular { count, .. } => n >= 2 && n <= count,
            Self::Grid { count, .. } => n >= 1 && n <= count,
        }
    }

    /// Offset of slot `index` relative to the pattern origin.
    #[must_use]
    pub fn slot_location(&self, index: usize) -> Vec3 {
        match *self {
            Self::Circular { count, spacing } => {
                let n = count.max(2) as f32;
                let radius = 0.5 * spacing / (PI / n).sin();
                let angle = 2.0 * PI * index as f32 / n;
                Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
            }
            Self::Grid { count, spacing } => {
                let columns = (count as f32).sqrt().ceil().max(1.0) as usize;
                let row = index / columns;
                let column = index % columns;
                Vec3::new(column as f32 * spacing, 0.0, row as f32 * spacing)
            }
        }
    }

    /// Centre of mass of the assigned slots.
    #[must_use]
    pub fn drift_offset(&self, assignments: &[SlotAssignment]) -> Vec3 {
        fleet_math::centroid(assignments.iter().map(|a| self.slot_location(a.slot)))
            .unwrap_or(Vec3::ZERO)
    }
}

/// Assign slots to `members` in entity-ID order.
#[must_use]
pub fn assign_slots(members: &[Entity]) -> Vec<SlotAssignment> {
    let mut sorted = members.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .into_iter()
        .enumerate()
        .map(|(slot, entity)| SlotAssignment { entity, slot })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn e(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn test_pattern_choice() {
        assert!(matches!(Pattern::for_group(3, 1.0), Pattern::Circular { .. }));
        assert!(matches!(Pattern::for_group(9, 1.0), Pattern::Grid { .. }));
        assert!(matches!(Pattern::for_group(1, 1.0), Pattern::Grid { .. }));
    }

    #[test]
    fn test_supports_slots() {
        let ring = Pattern::for_group(4, 1.0);
        assert!(ring.supports_slots(4));
        assert!(!ring.supports_slots(5));
        assert!(!ring.supports_slots(1));
        assert!(Pattern::for_group(20, 1.0).supports_slots(20));
    }

    #[test]
    fn test_circular_neighbours_are_spacing_apart() {
        let ring = Pattern::for_group(3, 6.0);
        let a = ring.slot_location(0);
        let b = ring.slot_location(1);
        assert_relative_eq!(a.distance(b), 6.0, epsilon = 1e-4);
        assert_eq!(a.y, 0.0);
    }

    #[test]
    fn test_drift_centres_formation() {
        let ring = Pattern::for_group(4, 2.0);
        let slots = assign_slots(&[e(1), e(2), e(3), e(4)]);
        let drift = ring.drift_offset(&slots);
        assert_relative_eq!(drift.length(), 0.0, epsilon = 1e-5);

        let grid = Pattern::Grid {
            count: 4,
            spacing: 2.0,
        };
        let drift = grid.drift_offset(&slots);
        assert_relative_eq!(drift.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(drift.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_slots_follow_entity_order() {
        let slots = assign_slots(&[e(7), e(2), e(5), e(2)]);
        let order: Vec<(u32, usize)> = slots.iter().map(|s| (s.entity.id(), s.slot)).collect();
        assert_eq!(order, vec![(2, 0), (5, 1), (7, 2)]);
    }
}
