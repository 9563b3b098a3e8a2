//! 3D transform component.
//!
//! [`Transform`] represents position, orientation, and scale in 3D space.
//! Every fleet entity has one; the physics system mutates it and the
//! broadcast hub serialises it.

use fleet_component::Component;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Smallest scale component a transform may carry.
pub const MIN_SCALE: f32 = 1e-3;

/// A 3D transform: position, unit-quaternion orientation, and per-axis scale.
///
/// The orientation is renormalised after every mutation made through this
/// type, and scale components are kept strictly positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    /// World-space position.
    pub position: Vec3,
    /// Orientation as a unit quaternion.
    pub orientation: Quat,
    /// Per-axis scale (edge lengths for a unit cube model).
    scale: Vec3,
}

impl Transform {
    /// The identity transform: origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a transform at `position` with the given scale.
    #[must_use]
    pub fn new(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            scale: scale.max(Vec3::splat(MIN_SCALE)),
        }
    }

    /// Returns the scale.
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Replace the scale, clamping every axis to [`MIN_SCALE`].
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale.max(Vec3::splat(MIN_SCALE));
    }

    /// Half the scale: the half-extents of the box this transform describes.
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        self.scale * 0.5
    }

    /// The height at which this transform rests on the plane `y = 0`.
    #[must_use]
    pub fn rest_height(&self) -> f32 {
        self.scale.y * 0.5
    }

    /// Integrate an angular velocity over `dt` seconds and renormalise.
    pub fn integrate_rotation(&mut self, angular_velocity: Vec3, dt: f32) {
        if angular_velocity == Vec3::ZERO {
            return;
        }
        let spin = Quat::from_xyzw(angular_velocity.x, angular_velocity.y, angular_velocity.z, 0.0);
        let delta = spin * self.orientation * (0.5 * dt);
        self.orientation = (self.orientation + delta).normalize();
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Component for Transform {
    fn type_name() -> &'static str {
        "Transform"
    }
}
