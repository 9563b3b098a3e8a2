//! # fleet_math
//!
//! Math types for the fleet world. Re-exports [`glam`] for linear algebra and
//! defines the [`Transform`] component every visible entity carries.

pub mod transform;

// Re-export glam types for convenience.
pub use glam::{Mat3, Quat, Vec3};

pub use transform::Transform;

/// Mean of a set of points, or `None` for an empty set.
#[must_use]
pub fn centroid<I>(points: I) -> Option<Vec3>
where
    I: IntoIterator<Item = Vec3>,
{
    let (sum, count) = points
        .into_iter()
        .fold((Vec3::ZERO, 0u32), |(sum, n), p| (sum + p, n + 1));
    (count > 0).then(|| sum / count as f32)
}
