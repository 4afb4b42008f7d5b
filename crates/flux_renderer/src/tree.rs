//! Median-split spatial tree.
//!
//! Built once from a fixed primitive set, then shared read-only across
//! worker threads. Each split node cycles through the X, Y and Z axes with
//! depth and splits at the median pivot value: primitives strictly below go
//! left, strictly above go right, and those exactly on the pivot stay in the
//! node's own page.

use flux_core::Hit;
use flux_math::{axis_value, Aabb, Frustum, Ray};

use crate::primitive::{cast_range, Bounded, Intersect};

/// Subtrees at least this large are built on the rayon pool.
const PARALLEL_BUILD_MIN: usize = 4096;

/// Default number of primitives per leaf page.
pub const DEFAULT_PAGE_SIZE: usize = 8;

enum TreeNode<P> {
    /// Leaf with at most `page_size` primitives.
    Page { primitives: Vec<P>, bbox: Aabb },
    /// Internal node; `page` holds primitives lying exactly on the pivot.
    Split {
        axis: usize,
        pivot: f32,
        bbox: Aabb,
        page: Vec<P>,
        left: Option<Box<TreeNode<P>>>,
        right: Option<Box<TreeNode<P>>>,
    },
}

/// Read-only spatial index over primitives of type `P`.
pub struct SpatialTree<P> {
    root: Option<TreeNode<P>>,
    len: usize,
}

impl<P: Bounded + Send> SpatialTree<P> {
    /// Build a tree, splitting until pages hold `page_size` primitives or fewer.
    pub fn build(primitives: Vec<P>, page_size: usize) -> Self {
        let len = primitives.len();
        let root = (len > 0).then(|| build_node(primitives, 0, page_size.max(1)));
        Self { root, len }
    }
}

impl<P> SpatialTree<P> {
    /// Number of indexed primitives.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bounds of every primitive in the tree (`Aabb::EMPTY` when empty).
    pub fn bounds(&self) -> Aabb {
        self.root.as_ref().map_or(Aabb::EMPTY, TreeNode::bbox)
    }

    /// Number of levels; 0 for an empty tree.
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Iterate all primitives in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &P> + '_ {
        let mut out = Vec::with_capacity(self.len);
        if let Some(root) = &self.root {
            root.collect(&|_: &Aabb| true, &|_: &P| true, &mut out);
        }
        out.into_iter()
    }
}

impl<P: Bounded> SpatialTree<P> {
    /// Primitives whose pivot lies inside `frustum`.
    pub fn fetch_within_frustum(&self, frustum: &Frustum) -> Vec<&P> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect(
                &|bbox: &Aabb| frustum.intersects_aabb(bbox),
                &|p: &P| frustum.contains_point(p.pivot()),
                &mut out,
            );
        }
        out
    }

    /// Primitives whose bounds overlap `query`.
    pub fn fetch_intersecting_bounds(&self, query: &Aabb) -> Vec<&P> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect(
                &|bbox: &Aabb| bbox.overlaps(query),
                &|p: &P| p.bounds().overlaps(query),
                &mut out,
            );
        }
        out
    }
}

impl<P: Intersect> SpatialTree<P> {
    /// Closest intersection along `ray`, if any.
    ///
    /// Visits every node whose box the ray crosses rather than stopping at
    /// the first hit.
    pub fn cast_ray(&self, ray: &Ray) -> Option<Hit> {
        let mut closest = None;
        if let Some(root) = &self.root {
            root.cast(ray, &mut closest);
        }
        closest
    }
}

fn build_node<P: Bounded + Send>(
    mut primitives: Vec<P>,
    depth: usize,
    page_size: usize,
) -> TreeNode<P> {
    let bbox = primitives
        .iter()
        .fold(Aabb::EMPTY, |acc, p| Aabb::surrounding(&acc, &p.bounds()));

    if primitives.len() <= page_size {
        return TreeNode::Page { primitives, bbox };
    }

    let axis = depth % 3;
    let key = |p: &P| axis_value(p.pivot(), axis);

    let mid = primitives.len() / 2;
    primitives.select_nth_unstable_by(mid, |a, b| key(a).total_cmp(&key(b)));
    let pivot = key(&primitives[mid]);

    let mut below = Vec::new();
    let mut above = Vec::new();
    let mut page = Vec::new();
    for p in primitives {
        let value = key(&p);
        if value < pivot {
            below.push(p);
        } else if value > pivot {
            above.push(p);
        } else {
            page.push(p);
        }
    }

    let build_side = |side: Vec<P>| {
        (!side.is_empty()).then(|| Box::new(build_node(side, depth + 1, page_size)))
    };
    let (left, right) = if below.len() + above.len() >= PARALLEL_BUILD_MIN {
        rayon::join(|| build_side(below), || build_side(above))
    } else {
        (build_side(below), build_side(above))
    };

    TreeNode::Split {
        axis,
        pivot,
        bbox,
        page,
        left,
        right,
    }
}

impl<P> TreeNode<P> {
    fn bbox(&self) -> Aabb {
        match self {
            TreeNode::Page { bbox, .. } | TreeNode::Split { bbox, .. } => *bbox,
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Page { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                let l = left.as_ref().map_or(0, |n| n.depth());
                let r = right.as_ref().map_or(0, |n| n.depth());
                1 + l.max(r)
            }
        }
    }

    /// A split must keep the primitives on its pivot, or have both children.
    fn is_malformed(&self) -> bool {
        match self {
            TreeNode::Page { .. } => false,
            TreeNode::Split {
                page, left, right, ..
            } => page.is_empty() && (left.is_none() || right.is_none()),
        }
    }

    /// Depth-first walk collecting primitives that pass `keep`, pruning
    /// subtrees whose box fails `visit`.
    fn collect<'a>(
        &'a self,
        visit: &dyn Fn(&Aabb) -> bool,
        keep: &dyn Fn(&P) -> bool,
        out: &mut Vec<&'a P>,
    ) {
        if !visit(&self.bbox()) {
            return;
        }
        if self.is_malformed() {
            log::warn!("Skipping malformed split node during query");
            return;
        }

        match self {
            TreeNode::Page { primitives, .. } => {
                out.extend(primitives.iter().filter(|p| keep(p)));
            }
            TreeNode::Split {
                page, left, right, ..
            } => {
                out.extend(page.iter().filter(|p| keep(p)));
                for child in [left, right].into_iter().flatten() {
                    child.collect(visit, keep, out);
                }
            }
        }
    }
}

impl<P: Intersect> TreeNode<P> {
    fn cast(&self, ray: &Ray, closest: &mut Option<Hit>) {
        if !self.bbox().hit(ray, cast_range()) {
            return;
        }
        if self.is_malformed() {
            log::warn!("Skipping malformed split node during ray cast");
            return;
        }

        let primitives = match self {
            TreeNode::Page { primitives, .. } => primitives,
            TreeNode::Split { page, .. } => page,
        };
        for hit in primitives.iter().filter_map(|p| p.intersect(ray, cast_range())) {
            if closest.map_or(true, |c| hit.distance < c.distance) {
                *closest = Some(hit);
            }
        }

        if let TreeNode::Split {
            axis,
            pivot,
            left,
            right,
            ..
        } = self
        {
            // Side holding the ray origin first; both sides are always visited
            let children = if axis_value(ray.origin, *axis) <= *pivot {
                [left, right]
            } else {
                [right, left]
            };
            for child in children.into_iter().flatten() {
                child.cast(ray, closest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Triangle;
    use flux_core::MaterialId;
    use flux_math::Vec3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Small triangle in the XY plane centered at (x, y, z), facing +Z.
    fn tri_at(x: f32, y: f32, z: f32) -> Triangle {
        Triangle::new(
            Vec3::new(x - 0.4, y - 0.4, z),
            Vec3::new(x + 0.4, y - 0.4, z),
            Vec3::new(x, y + 0.4, z),
            MaterialId(0),
        )
    }

    fn random_triangles(count: usize, seed: u64) -> Vec<Triangle> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                tri_at(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = SpatialTree::<Triangle>::build(Vec::new(), 4);

        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.bounds().is_empty());
        assert!(tree.cast_ray(&Ray::new(Vec3::ZERO, Vec3::Z)).is_none());
        assert!(tree.fetch_within_frustum(&Frustum::default()).is_empty());
    }

    #[test]
    fn test_small_set_is_single_page() {
        let tree = SpatialTree::build(vec![tri_at(0.0, 0.0, 0.0), tri_at(1.0, 0.0, 0.0)], 4);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_covering_bounds_returns_everything() {
        let triangles = random_triangles(500, 7);
        let tree = SpatialTree::build(triangles.clone(), 4);
        assert!(tree.depth() > 1);

        let found = tree.fetch_intersecting_bounds(&tree.bounds());
        assert_eq!(found.len(), triangles.len());

        let mut got: Vec<Vec3> = found.iter().map(|t| t.pivot()).collect();
        let mut want: Vec<Vec3> = triangles.iter().map(|t| t.pivot()).collect();
        let order = |a: &Vec3, b: &Vec3| a.to_array().partial_cmp(&b.to_array()).unwrap();
        got.sort_by(order);
        want.sort_by(order);
        assert_eq!(got, want);
    }

    #[test]
    fn test_iter_visits_every_primitive() {
        let tree = SpatialTree::build(random_triangles(200, 3), 2);
        assert_eq!(tree.iter().count(), 200);
    }

    #[test]
    fn test_equal_pivots_stay_in_page() {
        // Every pivot is identical, so no child can be built
        let tree = SpatialTree::build(vec![tri_at(1.0, 1.0, 1.0); 10], 2);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.fetch_intersecting_bounds(&tree.bounds()).len(), 10);
    }

    #[test]
    fn test_cross_right_half() {
        let cross = vec![
            tri_at(0.0, 0.0, 0.0),
            tri_at(-2.0, 0.0, 0.0),
            tri_at(2.0, 0.0, 0.0),
            tri_at(0.0, 2.0, 0.0),
            tri_at(0.0, -2.0, 0.0),
        ];
        let tree = SpatialTree::build(cross, 1);

        let right_half = Aabb::from_points(Vec3::new(0.0, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0));
        let mut found: Vec<f32> = tree
            .fetch_intersecting_bounds(&right_half)
            .iter()
            .map(|t| t.pivot().x.round())
            .collect();
        found.sort_by(f32::total_cmp);

        assert_eq!(found, vec![0.0, 2.0]);
    }

    #[test]
    fn test_cast_ray_returns_closest() {
        let far = tri_at(0.0, 0.0, -2.0);
        let near = tri_at(0.0, 0.0, -1.0);
        let tree = SpatialTree::build(vec![far, near], 1);

        let hit = tree.cast_ray(&Ray::new(Vec3::ZERO, -Vec3::Z)).unwrap();
        assert!((hit.distance - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cast_ray_matches_brute_force() {
        let triangles = random_triangles(400, 11);
        let tree = SpatialTree::build(triangles.clone(), 4);
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..200 {
            let origin = Vec3::new(
                rng.gen_range(-60.0..60.0),
                rng.gen_range(-60.0..60.0),
                60.0,
            );
            let target = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), 0.0);
            let ray = Ray::new(origin, (target - origin).normalize());

            let expected = triangles
                .iter()
                .filter_map(|t| t.intersect(&ray, cast_range()))
                .map(|h| h.distance)
                .min_by(f32::total_cmp);
            let got = tree.cast_ray(&ray).map(|h| h.distance);
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_frustum_gather_uses_pivots() {
        let triangles: Vec<Triangle> = (0..10).map(|i| tri_at(i as f32, 0.0, -5.0)).collect();
        let tree = SpatialTree::build(triangles, 2);

        // Narrow pyramid down -Z around x in [-1.5, 1.5] at z=-5
        let frustum = Frustum::from_pyramid(
            Vec3::ZERO,
            [
                Vec3::new(-0.3, -0.3, -1.0),
                Vec3::new(0.3, -0.3, -1.0),
                Vec3::new(0.3, 0.3, -1.0),
                Vec3::new(-0.3, 0.3, -1.0),
            ],
            100.0,
        );

        let mut found: Vec<f32> = tree
            .fetch_within_frustum(&frustum)
            .iter()
            .map(|t| t.pivot().x.round())
            .collect();
        found.sort_by(f32::total_cmp);
        assert_eq!(found, vec![0.0, 1.0]);
    }

    #[test]
    fn test_malformed_split_is_skipped() {
        let broken = TreeNode::<Triangle>::Split {
            axis: 0,
            pivot: 0.0,
            bbox: Aabb::UNIVERSE,
            page: Vec::new(),
            left: Some(Box::new(TreeNode::Page {
                primitives: vec![tri_at(0.0, 0.0, -1.0)],
                bbox: Aabb::UNIVERSE,
            })),
            right: None,
        };
        let tree = SpatialTree {
            root: Some(broken),
            len: 1,
        };

        assert!(tree.cast_ray(&Ray::new(Vec3::ZERO, -Vec3::Z)).is_none());
        assert!(tree.fetch_intersecting_bounds(&Aabb::UNIVERSE).is_empty());
    }

    #[test]
    fn test_parallel_build_matches_size() {
        let triangles = random_triangles(PARALLEL_BUILD_MIN * 2, 5);
        let tree = SpatialTree::build(triangles, DEFAULT_PAGE_SIZE);
        assert_eq!(tree.len(), PARALLEL_BUILD_MIN * 2);
        assert_eq!(tree.iter().count(), PARALLEL_BUILD_MIN * 2);
    }
}
