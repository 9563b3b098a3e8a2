//! Steering behaviours.
//!
//! Every behaviour returns an acceleration; callers scale by mass or inertia
//! when applying the result to a body. Behaviours compose by summation.
//!
//! Clustered entities arrive at a formation slot around the group centroid
//! instead of seeking the centroid itself. The AI states therefore do not use
//! [`cohesion`]; it serves flocking without a formation.

use std::ops::{Add, AddAssign};

use fleet_math::Vec3;

use crate::physics::horizontal;

/// Linear and angular acceleration requested by a behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteeringOutput {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl SteeringOutput {
    pub const ZERO: Self = Self {
        linear: Vec3::ZERO,
        angular: Vec3::ZERO,
    };

    #[must_use]
    pub fn linear(linear: Vec3) -> Self {
        Self {
            linear,
            angular: Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn angular(angular: Vec3) -> Self {
        Self {
            linear: Vec3::ZERO,
            angular,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.linear == Vec3::ZERO && self.angular == Vec3::ZERO
    }
}

impl Add for SteeringOutput {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            linear: self.linear + rhs.linear,
            angular: self.angular + rhs.angular,
        }
    }
}

impl AddAssign for SteeringOutput {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Tuning for [`arrive`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrive {
    pub max_speed: f32,
    pub max_acceleration: f32,
    /// Inside this distance the desired speed falls linearly to zero.
    pub slow_radius: f32,
    /// Time over which the velocity error is corrected.
    pub time_to_target: f32,
}

impl Arrive {
    pub const MAX_SPEED: f32 = 25.0;
    pub const MAX_ACCELERATION: f32 = 80.0;
    pub const SLOW_RADIUS_SCALE: f32 = 3.0;
    pub const TIME_TO_TARGET: f32 = 0.1;

    /// Default tuning with a slowdown radius proportional to `scale`.
    #[must_use]
    pub fn for_scale(scale: f32) -> Self {
        Self {
            max_speed: Self::MAX_SPEED,
            max_acceleration: Self::MAX_ACCELERATION,
            slow_radius: Self::SLOW_RADIUS_SCALE * scale,
            time_to_target: Self::TIME_TO_TARGET,
        }
    }
}

/// Full acceleration towards `target`, ignoring current velocity.
#[must_use]
pub fn seek(position: Vec3, target: Vec3, max_acceleration: f32) -> Vec3 {
    horizontal(target - position).normalize_or_zero() * max_acceleration
}

/// Accelerate towards `target`, slowing down inside the slow radius so the
/// body comes to rest on it.
#[must_use]
pub fn arrive(position: Vec3, velocity: Vec3, target: Vec3, params: &Arrive) -> Vec3 {
    let to_target = horizontal(target - position);
    let distance = to_target.length();
    let speed = if distance >= params.slow_radius {
        params.max_speed
    } else {
        params.max_speed * distance / params.slow_radius
    };
    let desired = to_target.normalize_or_zero() * speed;
    let correction = (desired - horizontal(velocity)) / params.time_to_target;
    correction.clamp_length_max(params.max_acceleration)
}

/// Separation strength: acceleration is `SEPARATION_DECAY / d²`.
pub const SEPARATION_DECAY: f32 = 400.0;

/// Neighbours closer than `SEPARATION_RANGE * scale` repel.
pub const SEPARATION_RANGE: f32 = 1.5;

/// Push away from every neighbour closer than `range`, with a strength that
/// falls off with the squared distance.
#[must_use]
pub fn separation(
    position: Vec3,
    neighbours: impl IntoIterator<Item = Vec3>,
    range: f32,
    max_acceleration: f32,
) -> Vec3 {
    let mut total = Vec3::ZERO;
    for neighbour in neighbours {
        let away = horizontal(position - neighbour);
        let distance_sq = away.length_squared();
        if distance_sq >= range * range {
            continue;
        }
        let Some(direction) = away.try_normalize() else {
            continue;
        };
        let strength = (SEPARATION_DECAY / distance_sq.max(1e-4)).min(max_acceleration);
        total += direction * strength;
    }
    total.clamp_length_max(max_acceleration)
}

/// Seek the centroid of `neighbours`.
#[must_use]
pub fn cohesion(
    position: Vec3,
    neighbours: impl IntoIterator<Item = Vec3>,
    max_acceleration: f32,
) -> Vec3 {
    fleet_math::centroid(neighbours)
        .map_or(Vec3::ZERO, |center| seek(position, center, max_acceleration))
}
