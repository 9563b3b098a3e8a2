//! Components attached to simulated entities, besides [`Transform`] and
//! [`FleetInstance`](fleet_cloud::FleetInstance).

use fleet_component::Component;
use fleet_math::{Transform, Vec3};
use serde::{Deserialize, Serialize};

// ── Graphic ─────────────────────────────────────────────────────────────────

/// The model a client should draw for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModelKind {
    #[default]
    Cube = 1,
    Plane = 2,
    Sphere = 3,
}

impl ModelKind {
    /// The code carried in the MODEL_TYPE field.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Visual representation. Whether a given client has seen the entity is
/// tracked per client by the broadcast hub.
///
/// The revision changes whenever a field a client only receives in full
/// (model or scale) changes, so clients holding an older revision are sent
/// the entity in full again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Graphic {
    pub model: ModelKind,
    revision: u32,
}

impl Graphic {
    #[must_use]
    pub const fn new(model: ModelKind) -> Self {
        Self { model, revision: 0 }
    }

    #[must_use]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Mark the appearance as changed.
    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl Component for Graphic {
    fn type_name() -> &'static str {
        "Graphic"
    }
}

// ── Body ────────────────────────────────────────────────────────────────────

/// Fraction of linear velocity retained after one second without forces.
pub const LINEAR_DAMPING: f32 = 0.05;

/// Fraction of angular velocity retained after one second without torques.
pub const ANGULAR_DAMPING: f32 = 0.5;

/// A rigid body.
///
/// Forces and torques accumulate between physics steps and are cleared at the
/// end of each step. A non-zero force or torque wakes a sleeping body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    mass: f32,
    inverse_mass: f32,
    /// Principal inverse inertia in body space.
    inverse_inertia: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    force: Vec3,
    torque: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    awake: bool,
    /// Seconds spent below the sleep threshold.
    pub(crate) rest_time: f32,
}

impl Body {
    /// A body of `mass` shaped like a solid box with the given half-extents.
    ///
    /// Non-positive or non-finite masses are raised to a small positive mass.
    #[must_use]
    pub fn new(mass: f32, half_extents: Vec3) -> Self {
        let mass = if mass.is_finite() && mass > 0.0 {
            mass
        } else {
            f32::EPSILON
        };
        let mut body = Self {
            mass,
            inverse_mass: 1.0 / mass,
            inverse_inertia: Vec3::ZERO,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            linear_damping: LINEAR_DAMPING,
            angular_damping: ANGULAR_DAMPING,
            awake: true,
            rest_time: 0.0,
        };
        body.set_shape(half_extents);
        body
    }

    /// Recompute the inertia tensor for a box with new half-extents.
    pub fn set_shape(&mut self, half_extents: Vec3) {
        let e = half_extents * 2.0;
        let (x2, y2, z2) = (e.x * e.x, e.y * e.y, e.z * e.z);
        let inertia = Vec3::new(y2 + z2, x2 + z2, x2 + y2) * (self.mass / 12.0);
        self.inverse_inertia = inertia.max(Vec3::splat(f32::EPSILON)).recip();
    }

    /// Change the mass, keeping the shape.
    pub fn set_mass(&mut self, mass: f32, half_extents: Vec3) {
        *self = Self {
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
            force: self.force,
            torque: self.torque,
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            awake: self.awake,
            rest_time: self.rest_time,
            ..Self::new(mass, half_extents)
        };
    }

    #[must_use]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[must_use]
    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    #[must_use]
    pub fn inverse_inertia(&self) -> Vec3 {
        self.inverse_inertia
    }

    /// Principal moments of inertia in body space.
    #[must_use]
    pub fn inertia(&self) -> Vec3 {
        self.inverse_inertia.recip()
    }

    #[must_use]
    pub fn force(&self) -> Vec3 {
        self.force
    }

    #[must_use]
    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn add_force(&mut self, force: Vec3) {
        if force != Vec3::ZERO {
            self.force += force;
            self.wake();
        }
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        if torque != Vec3::ZERO {
            self.torque += torque;
            self.wake();
        }
    }

    pub fn wake(&mut self) {
        self.awake = true;
        self.rest_time = 0.0;
    }

    /// Put the body to sleep, zeroing its velocities.
    pub fn sleep(&mut self) {
        self.awake = false;
        self.rest_time = 0.0;
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
    }

    /// Kinetic measure used for the sleep test: `|v|² + |ω|²`.
    #[must_use]
    pub fn motion(&self) -> f32 {
        self.linear_velocity.length_squared() + self.angular_velocity.length_squared()
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}

impl Component for Body {
    fn type_name() -> &'static str {
        "Body"
    }
}

// ── Collision ───────────────────────────────────────────────────────────────

/// Collision geometry, centred on the owning transform's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Axis-aligned box.
    Rectangle { half_size: Vec3 },
    Sphere { radius: f32 },
}

/// Collision volume of an entity.
///
/// Unless `decoupled`, the geometry follows the owning transform's scale and
/// is refreshed before every collision pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub shape: Shape,
    pub decoupled: bool,
}

impl Collision {
    /// A box matching `transform`'s scale.
    #[must_use]
    pub fn rectangle(transform: &Transform) -> Self {
        Self {
            shape: Shape::Rectangle {
                half_size: transform.half_extents(),
            },
            decoupled: false,
        }
    }

    /// Geometry that ignores the owning scale.
    #[must_use]
    pub fn fixed(shape: Shape) -> Self {
        Self {
            shape,
            decoupled: true,
        }
    }

    /// Refresh the geometry from `transform` unless decoupled.
    pub fn sync(&mut self, transform: &Transform) {
        if self.decoupled {
            return;
        }
        let half = transform.half_extents();
        self.shape = match self.shape {
            Shape::Rectangle { .. } => Shape::Rectangle { half_size: half },
            Shape::Sphere { .. } => Shape::Sphere { radius: half.x },
        };
    }
}

impl Component for Collision {
    fn type_name() -> &'static str {
        "Collision"
    }
}
