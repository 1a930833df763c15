//! Spatial index (C2): an R-tree over features' metric bounding boxes.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::feature::FeatureStore;
use crate::geom::distance_from_point;
use crate::ids::{FeatureId, LayerKey};
use geo::{Point, Rect};

/// One leaf of the R-tree: a feature's metric bounding box plus the id it
/// resolves to. Geometry itself lives in the [`FeatureStore`]; the index only
/// ever hands back ids, which callers refine with exact tests.
#[derive(Debug, Clone)]
struct IndexEntry {
    id: FeatureId,
    rect: Rect<f64>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.rect.min().x, self.rect.min().y], [self.rect.max().x, self.rect.max().y])
    }
}

impl PointDistance for IndexEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.envelope().distance_2(point)
    }
}

/// Immutable spatial index over a [`FeatureStore`]'s metric geometries.
///
/// Built once from the whole feature store; there is no incremental update
/// operation, matching the single-shot ingest→index→connect pipeline.
pub struct SpatialIndex {
    tree: RTree<IndexEntry>,
}

fn bbox_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

impl SpatialIndex {
    /// Bulk-load every feature's metric bounding box.
    pub fn build(store: &FeatureStore) -> Self {
        let entries: Vec<IndexEntry> = store
            .iter()
            .map(|f| IndexEntry { id: f.id.clone(), rect: f.metric.bounding_rect() })
            .collect();
        Self { tree: RTree::bulk_load(entries) }
    }

    /// Over-approximate candidate set: every feature whose bounding box
    /// intersects `rect`. Callers must refine with an exact geometry test —
    /// the index never promises the geometry itself is within `rect`.
    pub fn query_bbox(&self, rect: Rect<f64>) -> Vec<FeatureId> {
        self.tree
            .locate_in_envelope_intersecting(&bbox_aabb(rect))
            .map(|e| e.id.clone())
            .collect()
    }

    /// The `k` nearest features to `point` by true metric distance (refined
    /// against `store`'s geometries, not just bounding boxes), optionally
    /// restricted to `layers`. Ties are broken by layer key then feature
    /// ordinal for a stable, reproducible order.
    pub fn nearest(
        &self,
        store: &FeatureStore,
        point: Point<f64>,
        k: usize,
        layers: Option<&[LayerKey]>,
    ) -> Vec<(FeatureId, f64)> {
        // Envelope-ordered traversal over-fetches candidates relative to `k`
        // since AABB distance is a lower bound on true geometry distance, not
        // the distance itself; widen the pool before the final truncation.
        let overfetch = (k * 4).max(32);
        let mut candidates: Vec<(FeatureId, f64)> = self
            .tree
            .nearest_neighbor_iter(&[point.x(), point.y()])
            .filter(|e| layers.map_or(true, |ls| ls.contains(&e.id.layer)))
            .take(overfetch)
            .filter_map(|e| {
                let feature = store.get(&e.id)?;
                Some((e.id.clone(), distance_from_point(point, &feature.metric)))
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap()
                .then_with(|| a.0.layer.cmp(&b.0.layer))
                .then_with(|| a.0.ordinal.cmp(&b.0.ordinal))
        });
        candidates.truncate(k);
        candidates
    }
}
