//! Collision detection and response.
//!
//! The population is one entity per VM, so the broad phase is a plain
//! pairwise sweep. Contacts are resolved in the horizontal plane only; the
//! ground clamp owns the vertical axis.

use fleet_component::Entity;
use fleet_math::Vec3;
use tracing::trace;

use crate::components::Shape;
use crate::physics::horizontal;
use crate::world::World;

/// A penetrating contact between two volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Horizontal unit normal pointing from the first volume to the second.
    pub normal: Vec3,
    /// Penetration depth along `normal`.
    pub depth: f32,
}

/// Test two volumes centred at `a_pos` and `b_pos`.
#[must_use]
pub fn intersect(a: &Shape, a_pos: Vec3, b: &Shape, b_pos: Vec3) -> Option<Contact> {
    match (a, b) {
        (Shape::Rectangle { half_size: ha }, Shape::Rectangle { half_size: hb }) => {
            box_box(*ha, a_pos, *hb, b_pos)
        }
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(*ra, a_pos, *rb, b_pos)
        }
        (Shape::Rectangle { half_size }, Shape::Sphere { radius }) => {
            box_sphere(*half_size, a_pos, *radius, b_pos)
        }
        (Shape::Sphere { radius }, Shape::Rectangle { half_size }) => {
            box_sphere(*half_size, b_pos, *radius, a_pos).map(|c| Contact {
                normal: -c.normal,
                depth: c.depth,
            })
        }
    }
}

fn box_box(ha: Vec3, a_pos: Vec3, hb: Vec3, b_pos: Vec3) -> Option<Contact> {
    let d = b_pos - a_pos;
    let overlap = (ha + hb) - d.abs();
    if overlap.x <= 0.0 || overlap.y <= 0.0 || overlap.z <= 0.0 {
        return None;
    }
    let (normal, depth) = if overlap.x < overlap.z {
        (Vec3::new(sign(d.x), 0.0, 0.0), overlap.x)
    } else {
        (Vec3::new(0.0, 0.0, sign(d.z)), overlap.z)
    };
    Some(Contact { normal, depth })
}

fn sphere_sphere(ra: f32, a_pos: Vec3, rb: f32, b_pos: Vec3) -> Option<Contact> {
    let d = b_pos - a_pos;
    let reach = ra + rb;
    if d.length_squared() >= reach * reach {
        return None;
    }
    let flat = horizontal(d);
    let normal = flat.try_normalize().unwrap_or(Vec3::X);
    Some(Contact {
        normal,
        depth: reach - flat.length(),
    })
}

fn box_sphere(half: Vec3, box_pos: Vec3, radius: f32, sphere_pos: Vec3) -> Option<Contact> {
    let local = sphere_pos - box_pos;
    let closest = local.clamp(-half, half);
    let offset = local - closest;
    if offset.length_squared() >= radius * radius {
        return None;
    }
    if offset == Vec3::ZERO {
        // Centre inside the box: treat the sphere as its bounding box.
        return box_box(half, box_pos, Vec3::splat(radius), sphere_pos);
    }
    let flat = horizontal(offset);
    let normal = flat.try_normalize().unwrap_or(Vec3::X);
    Some(Contact {
        normal,
        depth: radius - flat.length(),
    })
}

fn sign(v: f32) -> f32 {
    if v < 0.0 { -1.0 } else { 1.0 }
}

/// Detect and resolve every overlapping pair. Returns the number of contacts.
///
/// Pairs where neither body is awake are skipped. Penetration is removed in
/// proportion to inverse mass and approaching velocity along the normal is
/// cancelled (no restitution). Both bodies of a contact are woken.
pub fn step(world: &mut World) -> usize {
    for (entity, collision) in world.collisions.iter_mut() {
        if let Some(transform) = world.transforms.get(entity) {
            collision.sync(transform);
        }
    }

    let entities: Vec<Entity> = world.collisions.entities().to_vec();
    let mut contacts = 0;
    for (i, &a) in entities.iter().enumerate() {
        for &b in &entities[i + 1..] {
            if !is_awake(world, a) && !is_awake(world, b) {
                continue;
            }
            let (Some(pa), Some(pb)) = (position(world, a), position(world, b)) else {
                continue;
            };
            let (Some(ca), Some(cb)) = (world.collisions.get(a), world.collisions.get(b)) else {
                continue;
            };
            let Some(contact) = intersect(&ca.shape, pa, &cb.shape, pb) else {
                continue;
            };
            resolve(world, a, b, contact);
            contacts += 1;
        }
    }
    contacts
}

fn is_awake(world: &World, entity: Entity) -> bool {
    world.bodies.get(entity).is_some_and(|b| b.is_awake())
}

fn position(world: &World, entity: Entity) -> Option<Vec3> {
    world.transforms.get(entity).map(|t| t.position)
}

fn inverse_mass(world: &World, entity: Entity) -> f32 {
    world.bodies.get(entity).map_or(0.0, |b| b.inverse_mass())
}

fn resolve(world: &mut World, a: Entity, b: Entity, contact: Contact) {
    let wa = inverse_mass(world, a);
    let wb = inverse_mass(world, b);
    let total = wa + wb;
    if total <= 0.0 {
        return;
    }
    let n = contact.normal;

    if let Some(t) = world.transforms.get_mut(a) {
        t.position -= n * (contact.depth * wa / total);
    }
    if let Some(t) = world.transforms.get_mut(b) {
        t.position += n * (contact.depth * wb / total);
    }

    let va = world.bodies.get(a).map_or(Vec3::ZERO, |body| body.linear_velocity);
    let vb = world.bodies.get(b).map_or(Vec3::ZERO, |body| body.linear_velocity);
    let closing = (vb - va).dot(n);
    let impulse = if closing < 0.0 { -closing / total } else { 0.0 };

    if let Some(body) = world.bodies.get_mut(a) {
        body.linear_velocity -= n * (impulse * wa);
        body.wake();
    }
    if let Some(body) = world.bodies.get_mut(b) {
        body.linear_velocity += n * (impulse * wb);
        body.wake();
    }
    trace!(%a, %b, depth = contact.depth, "contact resolved");
}
