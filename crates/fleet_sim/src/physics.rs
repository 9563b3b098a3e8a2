//! Rigid-body integration.
//!
//! Semi-implicit Euler: velocities are updated from the accumulated force and
//! torque first, then positions and orientations from the new velocities.
//! Damping is expressed as the fraction of velocity retained per second, so
//! it is applied as `damping^dt`.

use fleet_math::{Mat3, Vec3};

use crate::world::World;

/// Below this `|v|² + |ω|²` a body counts as resting.
pub const SLEEP_THRESHOLD: f32 = 0.01;

/// Seconds a body must rest before it is put to sleep.
pub const SLEEP_DELAY: f32 = 0.5;

/// Advance every body by `dt` seconds, then rest every transform on the
/// ground plane.
pub fn step(world: &mut World, dt: f32) {
    for (entity, body) in world.bodies.iter_mut() {
        let Some(transform) = world.transforms.get_mut(entity) else {
            body.clear_accumulators();
            continue;
        };
        if !body.is_awake() {
            body.clear_accumulators();
            continue;
        }

        let linear_acceleration = body.force() * body.inverse_mass();
        body.linear_velocity =
            body.linear_velocity * body.linear_damping.powf(dt) + linear_acceleration * dt;

        let rotation = Mat3::from_quat(transform.orientation);
        let inverse_inertia =
            rotation * Mat3::from_diagonal(body.inverse_inertia()) * rotation.transpose();
        let angular_acceleration = inverse_inertia * body.torque();
        body.angular_velocity =
            body.angular_velocity * body.angular_damping.powf(dt) + angular_acceleration * dt;

        body.clear_accumulators();

        // A body that falls asleep does not move on that step.
        if body.motion() < SLEEP_THRESHOLD {
            body.rest_time += dt;
            if body.rest_time > SLEEP_DELAY {
                body.sleep();
                continue;
            }
        } else {
            body.rest_time = 0.0;
        }

        transform.position += body.linear_velocity * dt;
        transform.integrate_rotation(body.angular_velocity, dt);
    }

    clamp_to_ground(world);
}

/// Rest every transform on `y = 0`. The ground plane owns the vertical axis,
/// so vertical velocity is cancelled as well.
fn clamp_to_ground(world: &mut World) {
    for (entity, transform) in world.transforms.iter_mut() {
        transform.position.y = transform.rest_height();
        if let Some(body) = world.bodies.get_mut(entity)
            && body.linear_velocity.y != 0.0
        {
            body.linear_velocity.y = 0.0;
        }
    }
}

/// Number of awake bodies.
#[must_use]
pub fn awake_count(world: &World) -> usize {
    world.bodies.iter().filter(|(_, b)| b.is_awake()).count()
}

/// Horizontal component of a vector.
#[must_use]
pub(crate) fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}
