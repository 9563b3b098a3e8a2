//! Per-kind component storage.
//!
//! A [`ComponentTable`] stores every component of one kind, densely packed in
//! insertion order with an entity → row index for O(1) lookup. Removal keeps
//! the remaining rows in their original order so iteration is stable across a
//! tick and between ticks.

use std::collections::HashMap;

use tracing::trace;

use crate::component::{Component, ComponentError};
use crate::entity::Entity;

/// Insertion-ordered storage for components of type `T`.
#[derive(Debug, Clone)]
pub struct ComponentTable<T> {
    /// Entity IDs in insertion order. `entities[i]` owns `rows[i]`.
    entities: Vec<Entity>,
    /// Component values, parallel with `entities`.
    rows: Vec<T>,
    /// Maps each entity to its row.
    index: HashMap<Entity, usize>,
}

impl<T: Component> ComponentTable<T> {
    /// Create a new, empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Attach `value` to `entity`, replacing any previous value.
    ///
    /// A replaced component keeps its original position in iteration order.
    /// Returns the previous value, if any.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(&row) = self.index.get(&entity) {
            return Some(std::mem::replace(&mut self.rows[row], value));
        }
        self.index.insert(entity, self.rows.len());
        self.entities.push(entity);
        self.rows.push(value);
        trace!(%entity, component = T::type_name(), "component added");
        None
    }

    /// Detach and return the component owned by `entity`.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let row = self.index.remove(&entity)?;
        self.entities.remove(row);
        let value = self.rows.remove(row);
        for shifted in &self.entities[row..] {
            if let Some(r) = self.index.get_mut(shifted) {
                *r -= 1;
            }
        }
        trace!(%entity, component = T::type_name(), "component removed");
        Some(value)
    }

    /// Returns the component owned by `entity`.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.index.get(&entity).map(|&row| &self.rows[row])
    }

    /// Returns the component owned by `entity` mutably.
    #[must_use]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.index.get(&entity).map(|&row| &mut self.rows[row])
    }

    /// Like [`ComponentTable::get`], but a missing component is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Missing`] if `entity` has no `T`.
    pub fn require(&self, entity: Entity) -> Result<&T, ComponentError> {
        self.get(entity)
            .ok_or_else(|| ComponentError::missing::<T>(entity))
    }

    /// Returns `true` if `entity` has a component in this table.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    /// Iterate `(entity, component)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.rows.iter())
    }

    /// Iterate `(entity, component)` pairs mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.rows.iter_mut())
    }

    /// Entity IDs in insertion order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns the number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T: Component> Default for ComponentTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Label(&'static str);

    impl Component for Label {
        fn type_name() -> &'static str {
            "Label"
        }
    }

    fn e(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = ComponentTable::new();
        assert!(table.insert(e(1), Label("a")).is_none());
        assert_eq!(table.get(e(1)), Some(&Label("a")));
        assert!(table.get(e(2)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut table = ComponentTable::new();
        table.insert(e(1), Label("a"));
        table.insert(e(2), Label("b"));
        assert_eq!(table.insert(e(1), Label("c")), Some(Label("a")));
        let order: Vec<_> = table.iter().map(|(ent, l)| (ent.id(), l.0)).collect();
        assert_eq!(order, vec![(1, "c"), (2, "b")]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut table = ComponentTable::new();
        for (id, name) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            table.insert(e(id), Label(name));
        }
        assert_eq!(table.remove(e(2)), Some(Label("b")));
        assert!(table.remove(e(2)).is_none());

        let order: Vec<_> = table.iter().map(|(ent, _)| ent.id()).collect();
        assert_eq!(order, vec![1, 3, 4]);
        // Index stays consistent after the shift.
        assert_eq!(table.get(e(4)), Some(&Label("d")));
        assert_eq!(table.get(e(3)), Some(&Label("c")));
    }

    #[test]
    fn test_require_reports_missing() {
        let table: ComponentTable<Label> = ComponentTable::new();
        let err = table.require(e(9)).unwrap_err();
        assert_eq!(err, ComponentError::missing::<Label>(e(9)));
    }

    #[test]
    fn test_iter_mut_updates_values() {
        let mut table = ComponentTable::new();
        table.insert(e(1), Label("a"));
        for (_, label) in table.iter_mut() {
            label.0 = "z";
        }
        assert_eq!(table.get(e(1)), Some(&Label("z")));
    }
}
