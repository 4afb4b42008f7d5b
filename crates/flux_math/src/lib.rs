//! Flux math - geometric primitives shared by the photon pipeline.
//!
//! Re-exports glam and adds the small set of types the transport and
//! gather stages need: rays, intervals, bounding boxes and frusta.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod frustum;
mod interval;
mod ray;

pub use aabb::Aabb;
pub use frustum::Frustum;
pub use interval::Interval;
pub use ray::Ray;

/// Component of `v` along `axis` (0=X, 1=Y, 2=Z).
#[inline]
pub fn axis_value(v: Vec3, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}
