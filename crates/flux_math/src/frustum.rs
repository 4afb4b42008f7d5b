//! Convex query volumes for photon gathering.
//!
//! A frustum is stored as six inward-facing planes. Pixel sensors build
//! theirs as a pyramid from the eye through the four pixel corners, capped
//! by a near plane at the apex and a far plane.

use crate::{Aabb, Vec3, Vec4};

/// A convex volume bounded by 6 planes.
///
/// Each plane is stored as a Vec4 where (x, y, z) is the normal and w is the distance.
/// A point P is on the inner side of the plane if: dot(normal, P) + w >= 0
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Build a pyramid from `apex` through the four `corners` (in winding
    /// order around the axis), truncated `far` units along the axis.
    pub fn from_pyramid(apex: Vec3, corners: [Vec3; 4], far: f32) -> Self {
        let center = corners.iter().copied().sum::<Vec3>() / 4.0;
        let axis = (center - apex).normalize_or_zero();

        let mut planes = [Vec4::ZERO; 6];
        for i in 0..4 {
            let a = corners[i] - apex;
            let b = corners[(i + 1) % 4] - apex;
            let mut normal = a.cross(b).normalize_or_zero();
            if normal.dot(center - apex) < 0.0 {
                normal = -normal;
            }
            planes[i] = plane_through(normal, apex);
        }

        // Near plane at the apex, far plane capping the pyramid
        planes[4] = plane_through(axis, apex);
        planes[5] = plane_through(-axis, apex + axis * far);

        Self { planes }
    }

    /// The six planes as (normal, distance) pairs.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Test if an AABB intersects the frustum.
    ///
    /// Returns true if the AABB is at least partially inside the frustum.
    /// Conservative: boxes near a corner of the frustum may pass without
    /// actually touching it, which only costs extra point tests.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let min = aabb.min();
        let max = aabb.max();

        self.planes.iter().all(|plane| {
            let normal = plane.truncate();

            // The corner furthest along the normal
            let p_vertex = Vec3::new(
                if normal.x >= 0.0 { max.x } else { min.x },
                if normal.y >= 0.0 { max.y } else { min.y },
                if normal.z >= 0.0 { max.z } else { min.z },
            );

            normal.dot(p_vertex) + plane.w >= 0.0
        })
    }

    /// Test if a point is inside the frustum.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }
}

impl Default for Frustum {
    fn default() -> Self {
        // Accepts everything
        Self {
            planes: [
                Vec4::new(1.0, 0.0, 0.0, f32::MAX),
                Vec4::new(-1.0, 0.0, 0.0, f32::MAX),
                Vec4::new(0.0, 1.0, 0.0, f32::MAX),
                Vec4::new(0.0, -1.0, 0.0, f32::MAX),
                Vec4::new(0.0, 0.0, 1.0, f32::MAX),
                Vec4::new(0.0, 0.0, -1.0, f32::MAX),
            ],
        }
    }
}

fn plane_through(normal: Vec3, point: Vec3) -> Vec4 {
    normal.extend(-normal.dot(point))
}
