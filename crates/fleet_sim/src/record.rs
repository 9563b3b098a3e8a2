//! Wire records for visible entities.

use fleet_cloud::FleetInstance;
use fleet_component::Entity;
use fleet_math::Transform;
use fleet_net::EntityRecord;

use crate::components::Graphic;
use crate::world::World;

/// Health reported for entities without a fleet instance.
const DEFAULT_HEALTH: f32 = 1.0;

/// A visible entity: one with both a transform and a graphic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visible {
    pub entity: Entity,
    /// Whether the body moved this tick. Entities without a body never do.
    pub awake: bool,
    /// The graphic's revision; see [`Graphic::revision`].
    pub revision: u32,
}

/// Visible entities in insertion order.
pub fn visible(world: &World) -> impl Iterator<Item = Visible> + '_ {
    world
        .graphics
        .iter()
        .filter(|&(entity, _)| world.transforms.contains(entity))
        .map(|(entity, graphic)| Visible {
            entity,
            awake: world.bodies.get(entity).is_some_and(|b| b.is_awake()),
            revision: graphic.revision(),
        })
}

fn health(world: &World, entity: Entity) -> f32 {
    world
        .instances
        .get(entity)
        .map_or(DEFAULT_HEALTH, FleetInstance::health)
}

/// Everything a client needs to draw `entity` from scratch.
#[must_use]
pub fn full_record(world: &World, entity: Entity) -> Option<EntityRecord> {
    let transform: &Transform = world.transforms.get(entity)?;
    let graphic: &Graphic = world.graphics.get(entity)?;
    Some(
        EntityRecord::id_only(entity)
            .with_position(transform.position)
            .with_orientation(transform.orientation)
            .with_model(graphic.model.code())
            .with_scale(transform.scale())
            .with_health(health(world, entity)),
    )
}

/// The fields that change while an already drawn entity moves.
#[must_use]
pub fn delta_record(world: &World, entity: Entity) -> Option<EntityRecord> {
    let transform: &Transform = world.transforms.get(entity)?;
    Some(
        EntityRecord::id_only(entity)
            .with_position(transform.position)
            .with_orientation(transform.orientation)
            .with_health(health(world, entity)),
    )
}
