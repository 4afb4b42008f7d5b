//! Hit indexes and per-pixel radiance gathering.

use std::sync::Arc;

use flux_core::{Color, HitIndexKind, PhotonHit, PipelineConfig};
use flux_math::Frustum;
use log::info;

use crate::incremental::IncrementalTree;
use crate::sensor::PixelSensor;
use crate::tree::SpatialTree;

/// A finalized, read-only collection of photon hits that can be queried
/// by frustum. Shared by all workers during the write phase.
pub trait HitIndex: Send + Sync {
    /// Hits whose position lies inside `frustum`.
    fn gather(&self, frustum: &Frustum) -> Vec<&PhotonHit>;

    /// Total number of indexed hits.
    fn hit_count(&self) -> usize;
}

impl HitIndex for SpatialTree<PhotonHit> {
    fn gather(&self, frustum: &Frustum) -> Vec<&PhotonHit> {
        self.fetch_within_frustum(frustum)
    }

    fn hit_count(&self) -> usize {
        self.len()
    }
}

impl HitIndex for IncrementalTree<PhotonHit> {
    fn gather(&self, frustum: &Frustum) -> Vec<&PhotonHit> {
        self.fetch_within_frustum(frustum)
    }

    fn hit_count(&self) -> usize {
        self.len()
    }
}

/// Accumulates hits as they are drained from the hit queue.
///
/// The balanced tree needs the full set up front, so it buffers; the
/// incremental tree grows with every hit.
pub enum HitCollector {
    Buffered { hits: Vec<PhotonHit>, page_size: usize },
    Incremental(IncrementalTree<PhotonHit>),
}

impl HitCollector {
    pub fn new(config: &PipelineConfig) -> Self {
        match config.hit_index {
            HitIndexKind::Balanced => HitCollector::Buffered {
                hits: Vec::new(),
                page_size: config.page_size,
            },
            HitIndexKind::Incremental => HitCollector::Incremental(IncrementalTree::new(
                config.split_threshold,
                config.max_incremental_depth,
            )),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HitCollector::Buffered { hits, .. } => hits.len(),
            HitCollector::Incremental(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalize into a shareable index.
    pub fn finish(self) -> Arc<dyn HitIndex> {
        match self {
            HitCollector::Buffered { hits, page_size } => {
                let count = hits.len();
                let tree = SpatialTree::build(hits, page_size);
                info!("Built balanced hit index over {} hits (depth {})", count, tree.depth());
                Arc::new(tree)
            }
            HitCollector::Incremental(tree) => {
                info!(
                    "Finished incremental hit index over {} hits (depth {})",
                    tree.len(),
                    tree.depth()
                );
                Arc::new(tree)
            }
        }
    }
}

impl Extend<PhotonHit> for HitCollector {
    fn extend<I: IntoIterator<Item = PhotonHit>>(&mut self, iter: I) {
        match self {
            HitCollector::Buffered { hits, .. } => hits.extend(iter),
            HitCollector::Incremental(tree) => tree.extend(iter),
        }
    }
}

/// Index `hits` with the structure selected in `config`.
pub fn build_hit_index(hits: Vec<PhotonHit>, config: &PipelineConfig) -> Arc<dyn HitIndex> {
    let mut collector = HitCollector::new(config);
    collector.extend(hits);
    collector.finish()
}

/// Sum the radiance of hits seen by `sensor` on surfaces facing it.
pub fn gather_radiance(index: &dyn HitIndex, sensor: &PixelSensor) -> Color {
    index
        .gather(&sensor.frustum)
        .into_iter()
        .filter(|record| record.hit.normal.dot(-sensor.direction) > 0.0)
        .map(PhotonHit::color)
        .sum()
}
