//! The entity world.
//!
//! [`World`] owns the entity allocator, one [`ComponentTable`] per component
//! kind, and the set of entities deleted since the broadcast hub last looked.
//! It is a plain value owned by the simulation task; systems borrow it for
//! the duration of a step.

use std::collections::BTreeSet;

use fleet_cloud::FleetInstance;
use fleet_component::{Component, ComponentTable, Entity, EntityAllocator};
use fleet_math::Transform;
use tracing::debug;

use crate::ai::Controller;
use crate::components::{Body, Collision, Graphic};
use crate::error::SimError;

/// Component kinds the world has a table for.
pub trait Stored: Component + Sized {
    fn table(world: &World) -> &ComponentTable<Self>;
    fn table_mut(world: &mut World) -> &mut ComponentTable<Self>;
}

macro_rules! stored {
    ($ty:ty, $field:ident) => {
        impl Stored for $ty {
            fn table(world: &World) -> &ComponentTable<Self> {
                &world.$field
            }

            fn table_mut(world: &mut World) -> &mut ComponentTable<Self> {
                &mut world.$field
            }
        }
    };
}

stored!(Transform, transforms);
stored!(Graphic, graphics);
stored!(Body, bodies);
stored!(Collision, collisions);
stored!(Controller, controllers);
stored!(FleetInstance, instances);

/// Entities and their components.
#[derive(Debug, Default)]
pub struct World {
    allocator: EntityAllocator,
    /// Live entities. IDs only grow, so this is also creation order.
    live: BTreeSet<Entity>,
    /// Deleted since the last [`World::drain_deleted`], in deletion order.
    deleted: Vec<Entity>,
    pub(crate) transforms: ComponentTable<Transform>,
    pub(crate) graphics: ComponentTable<Graphic>,
    pub(crate) bodies: ComponentTable<Body>,
    pub(crate) collisions: ComponentTable<Collision>,
    pub(crate) controllers: ComponentTable<Controller>,
    pub(crate) instances: ComponentTable<FleetInstance>,
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new entity with no components.
    ///
    /// # Errors
    ///
    /// [`SimError::EntitiesExhausted`] once [`Entity::MAX`] IDs have been used.
    pub fn spawn(&mut self) -> Result<Entity, SimError> {
        let entity = self
            .allocator
            .allocate()
            .ok_or(SimError::EntitiesExhausted)?;
        self.live.insert(entity);
        Ok(entity)
    }

    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.live.contains(&entity)
    }

    /// Live entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Attach a component, replacing and returning any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownEntity`] if `entity` is not alive.
    pub fn add<T: Stored>(&mut self, entity: Entity, component: T) -> Result<Option<T>, SimError> {
        if !self.is_alive(entity) {
            return Err(SimError::UnknownEntity(entity));
        }
        Ok(T::table_mut(self).insert(entity, component))
    }

    #[must_use]
    pub fn get<T: Stored>(&self, entity: Entity) -> Option<&T> {
        T::table(self).get(entity)
    }

    pub fn get_mut<T: Stored>(&mut self, entity: Entity) -> Option<&mut T> {
        T::table_mut(self).get_mut(entity)
    }

    /// Like [`World::get`], but a missing component is an error.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Component`] if `entity` has no `T`.
    pub fn require<T: Stored>(&self, entity: Entity) -> Result<&T, SimError> {
        Ok(T::table(self).require(entity)?)
    }

    /// Detach a single component; the entity stays alive.
    pub fn remove<T: Stored>(&mut self, entity: Entity) -> Option<T> {
        T::table_mut(self).remove(entity)
    }

    /// Iterate one component kind in insertion order.
    pub fn iter<T: Stored>(&self) -> impl Iterator<Item = (Entity, &T)> {
        T::table(self).iter()
    }

    /// Delete an entity and every component it owns.
    ///
    /// The ID is queued for [`World::drain_deleted`]. Returns `false` if the
    /// entity was not alive.
    pub fn delete(&mut self, entity: Entity) -> bool {
        if !self.live.remove(&entity) {
            return false;
        }
        self.transforms.remove(entity);
        self.graphics.remove(entity);
        self.bodies.remove(entity);
        self.collisions.remove(entity);
        self.controllers.remove(entity);
        self.instances.remove(entity);
        self.deleted.push(entity);
        debug!(%entity, "entity deleted");
        true
    }

    /// Take every entity deleted since the previous call.
    pub fn drain_deleted(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.deleted)
    }

    /// The entity bound to a cloud instance ID.
    #[must_use]
    pub fn find_instance(&self, instance_id: &str) -> Option<Entity> {
        self.instances
            .iter()
            .find(|(_, instance)| instance.instance_id == instance_id)
            .map(|(entity, _)| entity)
    }
}
