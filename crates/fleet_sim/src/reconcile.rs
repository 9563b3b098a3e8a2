//! Merging fleet snapshots into the world.
//!
//! Runs on the simulation task between ticks, so it mutates the world
//! directly: new instances are spawned, known ones are updated in place, and
//! instances missing from the snapshot are deleted.

use std::collections::{HashMap, HashSet};

use fleet_cloud::{FleetInstance, FleetSnapshot, PowerState, pricing};
use fleet_component::Entity;
use fleet_math::{Transform, Vec3};
use rand::Rng;
use tracing::{debug, warn};

use crate::ai::Controller;
use crate::components::{Body, Collision, Graphic, ModelKind};
use crate::error::SimError;
use crate::world::World;

/// Body mass per dollar of hourly cost.
pub const MASS_PER_DOLLAR: f32 = 1000.0;

/// Where new entities appear.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnConfig {
    /// New entities are scattered uniformly over `[-r, r]` on x and z.
    pub scatter_radius: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            scatter_radius: 100.0,
        }
    }
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Mass of an instance of `class`.
#[must_use]
pub fn mass_for(class: &str) -> f32 {
    pricing::hourly_cost(class) as f32 * MASS_PER_DOLLAR
}

/// Apply `snapshot` to `world`.
///
/// Afterwards the set of bound instance IDs equals the snapshot's
/// non-terminated IDs. Changed instances have their bodies woken so the
/// change reaches clients on the next delta.
///
/// # Errors
///
/// Returns [`SimError`] if a freshly spawned entity cannot take its
/// components, which would mean the world is corrupt.
pub fn apply_snapshot<R: Rng + ?Sized>(
    world: &mut World,
    snapshot: &FleetSnapshot,
    config: &SpawnConfig,
    rng: &mut R,
) -> Result<ReconcileSummary, SimError> {
    let bound: HashMap<String, Entity> = world
        .instances
        .iter()
        .map(|(entity, instance)| (instance.instance_id.clone(), entity))
        .collect();

    let mut summary = ReconcileSummary::default();
    let mut seen = HashSet::with_capacity(snapshot.observations.len());

    for observation in &snapshot.observations {
        let id = &observation.instance.instance_id;
        if observation.instance.power_state == PowerState::Terminated || !seen.insert(id.clone()) {
            continue;
        }
        match bound.get(id) {
            Some(&entity) => {
                if update_instance(world, entity, observation)? {
                    summary.updated += 1;
                }
            }
            None => {
                let instance = FleetInstance::from_observation(observation);
                match spawn_instance(world, instance, config, rng) {
                    Ok(entity) => {
                        debug!(%entity, instance_id = %id, "instance spawned");
                        summary.created += 1;
                    }
                    Err(SimError::EntitiesExhausted) => {
                        warn!(instance_id = %id, "no entity ids left, instance not spawned");
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }

    for (id, entity) in bound {
        if !seen.contains(&id) {
            world.delete(entity);
            debug!(%entity, instance_id = %id, "instance removed");
            summary.deleted += 1;
        }
    }

    Ok(summary)
}

/// Spawn an entity for a newly seen instance at a random spot on the ground.
///
/// # Errors
///
/// [`SimError::EntitiesExhausted`] if no entity ID is left, otherwise
/// propagates [`SimError`] from component insertion.
pub fn spawn_instance<R: Rng + ?Sized>(
    world: &mut World,
    instance: FleetInstance,
    config: &SpawnConfig,
    rng: &mut R,
) -> Result<Entity, SimError> {
    let size = pricing::size(&instance.instance_class);
    let r = if config.scatter_radius.is_finite() {
        config.scatter_radius.abs()
    } else {
        0.0
    };
    let x = rng.gen_range(-r..=r);
    let z = rng.gen_range(-r..=r);
    let transform = Transform::new(Vec3::new(x, size / 2.0, z), Vec3::splat(size));
    let mass = mass_for(&instance.instance_class);

    let entity = world.spawn()?;
    world.add(entity, transform)?;
    world.add(entity, Graphic::new(ModelKind::Cube))?;
    world.add(entity, Body::new(mass, transform.half_extents()))?;
    world.add(entity, Collision::rectangle(&transform))?;
    world.add(entity, instance)?;
    world.add(entity, Controller::default())?;
    Ok(entity)
}

/// Merge an observation into an existing entity. Returns `true` on change.
fn update_instance(
    world: &mut World,
    entity: Entity,
    observation: &fleet_cloud::Observation,
) -> Result<bool, SimError> {
    let instance = world
        .instances
        .get_mut(entity)
        .ok_or(SimError::UnknownEntity(entity))?;
    let previous_class = instance.instance_class.clone();
    if !instance.merge(observation) {
        return Ok(false);
    }
    let class = instance.instance_class.clone();

    if class != previous_class {
        let size = pricing::size(&class);
        if let Some(transform) = world.transforms.get_mut(entity) {
            transform.set_scale(Vec3::splat(size));
            if let Some(body) = world.bodies.get_mut(entity) {
                body.set_mass(mass_for(&class), transform.half_extents());
            }
        }
        if let Some(graphic) = world.graphics.get_mut(entity) {
            graphic.touch();
        }
        debug!(%entity, from = %previous_class, to = %class, "instance resized");
    }

    if let Some(body) = world.bodies.get_mut(entity) {
        body.wake();
    }
    Ok(true)
}
