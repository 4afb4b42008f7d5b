use crate::Vec3;

/// A ray in 3D space with an origin and a direction.
///
/// Photons carry one of these; the direction is not required to be
/// normalized, but emitters and bounce logic always produce unit vectors.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Move the origin a small distance along `normal` so a ray leaving a
    /// surface does not immediately re-hit it.
    pub fn offset_from(point: Vec3, normal: Vec3, direction: Vec3) -> Self {
        let side = if normal.dot(direction) >= 0.0 { 1.0 } else { -1.0 };
        Self::new(point + normal * (side * 1e-4), direction)
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::Z,
        }
    }
}
