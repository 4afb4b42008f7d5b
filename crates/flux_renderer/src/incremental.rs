//! Append-only spatial tree for primitive sets that grow over time.
//!
//! Each leaf keeps a pivot equal to the mean of its primitives along the
//! axis for its depth. When a leaf fills up it becomes a branch on that
//! pivot with two empty children, and its primitives are inserted again
//! from there. Balance is not guaranteed; depth is capped so coincident
//! primitives cannot split forever.

use flux_math::{axis_value, Aabb, Frustum};

use crate::primitive::Bounded;

/// Default leaf size that triggers a split.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 8;

/// Default depth at which leaves stop splitting.
pub const DEFAULT_MAX_DEPTH: usize = 48;

enum Node<P> {
    Leaf {
        items: Vec<P>,
        pivot: f32,
        bbox: Aabb,
    },
    Branch {
        pivot: f32,
        bbox: Aabb,
        left: Box<Node<P>>,
        right: Box<Node<P>>,
    },
}

#[derive(Clone, Copy)]
struct Limits {
    split_threshold: usize,
    max_depth: usize,
}

/// Spatial index that accepts primitives one at a time.
pub struct IncrementalTree<P> {
    root: Node<P>,
    len: usize,
    limits: Limits,
}

impl<P> Default for IncrementalTree<P> {
    fn default() -> Self {
        Self::new(DEFAULT_SPLIT_THRESHOLD, DEFAULT_MAX_DEPTH)
    }
}

impl<P> IncrementalTree<P> {
    /// Create an empty tree. `split_threshold` is clamped to at least 2.
    pub fn new(split_threshold: usize, max_depth: usize) -> Self {
        Self {
            root: Node::empty_leaf(),
            len: 0,
            limits: Limits {
                split_threshold: split_threshold.max(2),
                max_depth,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bounds(&self) -> Aabb {
        self.root.bbox()
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }
}

impl<P: Bounded> IncrementalTree<P> {
    /// Add one primitive.
    pub fn insert(&mut self, primitive: P) {
        self.root.insert(primitive, 0, self.limits);
        self.len += 1;
    }

    /// Primitives whose pivot lies inside `frustum`.
    pub fn fetch_within_frustum(&self, frustum: &Frustum) -> Vec<&P> {
        let mut out = Vec::new();
        self.root.collect(
            &|bbox: &Aabb| frustum.intersects_aabb(bbox),
            &|p: &P| frustum.contains_point(p.pivot()),
            &mut out,
        );
        out
    }

    /// Primitives whose bounds overlap `query`.
    pub fn fetch_intersecting_bounds(&self, query: &Aabb) -> Vec<&P> {
        let mut out = Vec::new();
        self.root.collect(
            &|bbox: &Aabb| bbox.overlaps(query),
            &|p: &P| p.bounds().overlaps(query),
            &mut out,
        );
        out
    }
}

impl<P: Bounded> Extend<P> for IncrementalTree<P> {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        for primitive in iter {
            self.insert(primitive);
        }
    }
}

impl<P> Node<P> {
    fn empty_leaf() -> Self {
        Node::Leaf {
            items: Vec::new(),
            pivot: 0.0,
            bbox: Aabb::EMPTY,
        }
    }

    fn bbox(&self) -> Aabb {
        match self {
            Node::Leaf { bbox, .. } | Node::Branch { bbox, .. } => *bbox,
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Branch { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

impl<P: Bounded> Node<P> {
    fn insert(&mut self, primitive: P, depth: usize, limits: Limits) {
        let axis = depth % 3;

        match self {
            Node::Branch {
                pivot,
                bbox,
                left,
                right,
            } => {
                *bbox = Aabb::surrounding(bbox, &primitive.bounds());
                let child = if axis_value(primitive.pivot(), axis) <= *pivot {
                    left
                } else {
                    right
                };
                child.insert(primitive, depth + 1, limits);
                return;
            }
            Node::Leaf { items, pivot, bbox } => {
                *bbox = Aabb::surrounding(bbox, &primitive.bounds());
                items.push(primitive);
                let sum: f32 = items.iter().map(|p| axis_value(p.pivot(), axis)).sum();
                *pivot = sum / items.len() as f32;

                if items.len() < limits.split_threshold || depth >= limits.max_depth {
                    return;
                }
            }
        }

        self.split(depth, limits);
    }

    /// Turn a full leaf into a branch on its pivot and reinsert its items.
    fn split(&mut self, depth: usize, limits: Limits) {
        let (items, pivot) = match self {
            Node::Leaf { items, pivot, .. } => (std::mem::take(items), *pivot),
            Node::Branch { .. } => return,
        };

        *self = Node::Branch {
            pivot,
            bbox: Aabb::EMPTY,
            left: Box::new(Node::empty_leaf()),
            right: Box::new(Node::empty_leaf()),
        };
        for item in items {
            self.insert(item, depth, limits);
        }
    }

    fn collect<'a>(
        &'a self,
        visit: &dyn Fn(&Aabb) -> bool,
        keep: &dyn Fn(&P) -> bool,
        out: &mut Vec<&'a P>,
    ) {
        if !visit(&self.bbox()) {
            return;
        }
        match self {
            Node::Leaf { items, .. } => out.extend(items.iter().filter(|p| keep(p))),
            Node::Branch { left, right, .. } => {
                left.collect(visit, keep, out);
                right.collect(visit, keep, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_core::{Hit, Photon, PhotonHit};
    use flux_math::Vec3;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn hit_at(position: Vec3) -> PhotonHit {
        PhotonHit::new(
            Photon::default(),
            Hit {
                position,
                ..Default::default()
            },
        )
    }

    fn random_hits(count: usize, seed: u64) -> Vec<PhotonHit> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                hit_at(Vec3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                ))
            })
            .collect()
    }

    #[test]
    fn test_covering_query_returns_all_in_any_order() {
        let hits = random_hits(300, 1);
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..3 {
            let mut shuffled = hits.clone();
            shuffled.shuffle(&mut rng);

            let mut tree = IncrementalTree::new(4, DEFAULT_MAX_DEPTH);
            tree.extend(shuffled);

            assert_eq!(tree.len(), hits.len());
            assert!(tree.depth() > 1);
            assert_eq!(tree.fetch_intersecting_bounds(&tree.bounds()).len(), hits.len());
        }
    }

    #[test]
    fn test_threshold_of_two_splits_eagerly() {
        let mut tree = IncrementalTree::new(2, DEFAULT_MAX_DEPTH);
        tree.insert(hit_at(Vec3::new(-1.0, 0.0, 0.0)));
        assert_eq!(tree.depth(), 1);

        tree.insert(hit_at(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.fetch_intersecting_bounds(&Aabb::UNIVERSE).len(), 2);
    }

    #[test]
    fn test_coincident_points_stop_at_max_depth() {
        let mut tree = IncrementalTree::new(2, 6);
        tree.extend((0..20).map(|_| hit_at(Vec3::ONE)));

        assert_eq!(tree.len(), 20);
        assert!(tree.depth() <= 7);
        assert_eq!(tree.fetch_intersecting_bounds(&tree.bounds()).len(), 20);
    }

    #[test]
    fn test_frustum_query_matches_brute_force() {
        let hits = random_hits(500, 9);
        let mut tree = IncrementalTree::default();
        tree.extend(hits.iter().copied());

        let frustum = Frustum::from_pyramid(
            Vec3::new(0.0, 0.0, 20.0),
            [
                Vec3::new(-1.0, -1.0, 19.0),
                Vec3::new(1.0, -1.0, 19.0),
                Vec3::new(1.0, 1.0, 19.0),
                Vec3::new(-1.0, 1.0, 19.0),
            ],
            40.0,
        );

        let expected = hits
            .iter()
            .filter(|h| frustum.contains_point(h.position()))
            .count();
        assert!(expected > 0);
        assert_eq!(tree.fetch_within_frustum(&frustum).len(), expected);
    }

    #[test]
    fn test_partial_bounds_query() {
        let mut tree = IncrementalTree::new(2, DEFAULT_MAX_DEPTH);
        for x in 0..10 {
            tree.insert(hit_at(Vec3::new(x as f32, 0.0, 0.0)));
        }

        let query = Aabb::from_points(Vec3::new(2.5, -1.0, -1.0), Vec3::new(5.5, 1.0, 1.0));
        assert_eq!(tree.fetch_intersecting_bounds(&query).len(), 3);
    }
}
