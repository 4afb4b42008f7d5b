//! Triangle mesh geometry for scene objects.
//!
//! Meshes are stored in object space; the renderer transforms them into
//! world space when it builds per-object volumes.

use flux_math::{Aabb, Mat4, Vec3};

/// A mesh consisting of vertex positions and triangle indices.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            indices,
            bounds,
        }
    }

    /// A unit quad in the XZ plane centered at the origin, facing +Y.
    pub fn quad() -> Self {
        Self::new(
            vec![
                Vec3::new(-0.5, 0.0, -0.5),
                Vec3::new(-0.5, 0.0, 0.5),
                Vec3::new(0.5, 0.0, 0.5),
                Vec3::new(0.5, 0.0, -0.5),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    /// An axis-aligned box spanning `min..max` with outward-facing triangles.
    pub fn cuboid(min: Vec3, max: Vec3) -> Self {
        let positions = vec![
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 3, 2, 0, 2, 1, // -Z
            4, 5, 6, 4, 6, 7, // +Z
            0, 4, 7, 0, 7, 3, // -X
            1, 2, 6, 1, 6, 5, // +X
            0, 1, 5, 0, 5, 4, // -Y
            3, 7, 6, 3, 6, 2, // +Y
        ];
        Self::new(positions, indices)
    }

    /// Get the number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterate triangles as vertex triples, transformed by `matrix`.
    ///
    /// Trailing indices that do not form a full triangle are ignored, as are
    /// triangles referencing vertices that do not exist.
    pub fn world_triangles<'a>(
        &'a self,
        matrix: &'a Mat4,
    ) -> impl Iterator<Item = [Vec3; 3]> + 'a {
        self.indices.chunks_exact(3).filter_map(move |tri| {
            let fetch = |i: u32| self.positions.get(i as usize).copied();
            let (a, b, c) = (fetch(tri[0])?, fetch(tri[1])?, fetch(tri[2])?);
            Some([
                matrix.transform_point3(a),
                matrix.transform_point3(b),
                matrix.transform_point3(c),
            ])
        })
    }

    /// Compute axis-aligned bounding box from positions.
    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        if positions.is_empty() {
            return Aabb::EMPTY;
        }

        let (min, max) = positions.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        );
        Aabb::from_points(min, max)
    }
}
