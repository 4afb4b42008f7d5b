//! Triangle primitive for ray tracing.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use flux_core::{Hit, MaterialId};
use flux_math::{Aabb, Interval, Ray, Vec3};

use crate::primitive::{Bounded, Intersect};

/// A world-space triangle.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    /// Pre-computed face normal (unit length)
    normal: Vec3,
    material: MaterialId,
    bbox: Aabb,
}

impl Triangle {
    /// Create a new triangle from three vertices.
    ///
    /// The face normal follows counter-clockwise winding.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, material: MaterialId) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        let bbox = Aabb::from_points(v0.min(v1).min(v2), v0.max(v1).max(v2));

        Self {
            v0,
            v1,
            v2,
            normal,
            material,
            bbox,
        }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }
}

impl Bounded for Triangle {
    fn bounds(&self) -> Aabb {
        self.bbox
    }

    fn pivot(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }
}

impl Intersect for Triangle {
    /// Möller-Trumbore ray-triangle intersection.
    ///
    /// The returned normal faces against the ray, so it points to the side
    /// the photon arrived from.
    fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<Hit> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        if !ray_t.contains(t) {
            return None;
        }

        let normal = if ray.direction.dot(self.normal) < 0.0 {
            self.normal
        } else {
            -self.normal
        };

        Some(Hit {
            position: ray.at(t),
            normal,
            distance: t,
            material: self.material,
        })
    }
}
