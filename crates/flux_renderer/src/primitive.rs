//! Traits for things the spatial trees can index.

use flux_core::{Hit, PhotonHit};
use flux_math::{Aabb, Interval, Ray, Vec3};

/// Smallest ray parameter accepted as a hit, to skip self-intersection.
pub const RAY_EPSILON: f32 = 1e-4;

/// Ray parameter range used by every cast in the pipeline.
pub fn cast_range() -> Interval {
    Interval::new(RAY_EPSILON, f32::INFINITY)
}

/// Anything with a bounding box and a representative point.
///
/// The pivot decides which side of a split a primitive goes to and is the
/// point tested by frustum gathers.
pub trait Bounded {
    fn bounds(&self) -> Aabb;

    fn pivot(&self) -> Vec3;
}

/// Primitives that can be hit by rays.
pub trait Intersect: Bounded {
    /// Intersect within `ray_t`, returning the hit if there is one.
    fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<Hit>;
}

impl Bounded for PhotonHit {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.hit.position, self.hit.position)
    }

    fn pivot(&self) -> Vec3 {
        self.hit.position
    }
}
