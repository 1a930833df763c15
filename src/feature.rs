//! Feature store (C3): a canonical, read-only collection of ingested features.

use ahash::AHashMap;

use crate::geom::{Geom, MetricCrs};
use crate::ids::{FeatureId, LayerKey};

/// Optional commune/EPCI/department/region attributes carried by a feature.
/// None of these are consulted by any operation; they are passthrough output
/// fields, mirrored from the ingested record to the emitted one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub code_commune: Option<String>,
    pub nom_commune: Option<String>,
    pub code_epci: Option<String>,
    pub nom_epci: Option<String>,
    pub code_departement: Option<String>,
    pub nom_departement: Option<String>,
    pub code_region: Option<String>,
    pub nom_region: Option<String>,
}

/// One ingested grid element: a stable id, its source-layer geometry in both
/// WGS84 and metric form, and passthrough attributes.
///
/// The metric projection is computed once at ingest and never refreshed — a
/// `Feature` is immutable after construction.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: FeatureId,
    pub wgs84: Geom,
    pub metric: Geom,
    pub attributes: Attributes,
}

impl Feature {
    pub fn layer(&self) -> &LayerKey {
        &self.id.layer
    }
}

/// Raw ingested record, still in WGS84, not yet assigned an id or projected.
/// This is what the `Iterator<Item = ...>` external interface hands the store.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub layer: LayerKey,
    pub geometry: Geom,
    pub attributes: Attributes,
}

/// Why a raw feature was dropped at ingest instead of becoming a `Feature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestDrop {
    DegenerateGeometry { layer: LayerKey, ordinal: u64 },
    ProjectionFailed { layer: LayerKey, ordinal: u64, reason: String },
}

/// Number of distinct coordinates in `ls`. A linestring with fewer than two
/// is degenerate per the data-model invariant, whether that's a single-point
/// line or a two-point line whose endpoints happen to coincide; a closed
/// ring with a third, distinct interior coordinate is not affected.
fn distinct_coord_count(ls: &geo::LineString<f64>) -> usize {
    let mut seen: Vec<geo::Coord<f64>> = Vec::new();
    for &c in &ls.0 {
        if !seen.contains(&c) {
            seen.push(c);
        }
    }
    seen.len()
}

/// Keyed collection of features with O(1) lookup by id and per-layer iteration.
/// Built once by [`FeatureStore::ingest`]; never mutated afterward.
#[derive(Debug, Default)]
pub struct FeatureStore {
    by_id: AHashMap<FeatureId, Feature>,
    by_layer: AHashMap<LayerKey, Vec<FeatureId>>,
}

impl FeatureStore {
    /// Ingest raw features, assigning ordinals per layer in iteration order
    /// and projecting every geometry into `crs`. Degenerate linestrings
    /// (fewer than two distinct coordinates) and geometries whose projection
    /// fails are dropped with a diagnostic rather than aborting ingest.
    pub fn ingest(
        raw: impl IntoIterator<Item = RawFeature>,
        crs: &MetricCrs,
    ) -> (Self, Vec<IngestDrop>) {
        let mut store = Self::default();
        let mut next_ordinal: AHashMap<LayerKey, u64> = AHashMap::new();
        let mut drops = Vec::new();

        for raw in raw {
            let ordinal = {
                let counter = next_ordinal.entry(raw.layer.clone()).or_insert(0);
                let ordinal = *counter;
                *counter += 1;
                ordinal
            };

            if let Geom::LineString(ls) = &raw.geometry {
                if distinct_coord_count(ls) < 2 {
                    log::warn!("dropping degenerate linestring {}_{ordinal}", raw.layer);
                    drops.push(IngestDrop::DegenerateGeometry { layer: raw.layer, ordinal });
                    continue;
                }
            }

            let metric = match crate::geom::project_to_metric(&raw.geometry, crs) {
                Ok(metric) => metric,
                Err(err) => {
                    log::warn!("dropping feature {}_{ordinal}: projection failed: {err}", raw.layer);
                    drops.push(IngestDrop::ProjectionFailed {
                        layer: raw.layer,
                        ordinal,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let id = FeatureId::new(raw.layer, ordinal);
            store.by_layer.entry(id.layer.clone()).or_default().push(id.clone());
            store.by_id.insert(
                id.clone(),
                Feature { id, wgs84: raw.geometry, metric, attributes: raw.attributes },
            );
        }

        (store, drops)
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.by_id.values()
    }

    pub fn layer(&self, layer: &LayerKey) -> impl Iterator<Item = &Feature> {
        self.by_layer
            .get(layer)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.by_id.get(id))
    }

    /// All features, ordered deterministically by `(layer, ordinal)` — used
    /// wherever a driver needs to iterate "in index order" per the
    /// concurrency model's determinism guarantee.
    pub fn iter_in_index_order(&self) -> impl Iterator<Item = &Feature> {
        let mut ids: Vec<&FeatureId> = self.by_id.keys().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(move |id| self.by_id.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, LineString, Point};

    fn crs() -> MetricCrs {
        MetricCrs::from_bounds(geo::Rect::new(
            geo::Coord { x: -1.0, y: 48.0 },
            geo::Coord { x: 1.0, y: 49.0 },
        ))
        .unwrap()
    }

    #[test]
    fn ingest_assigns_ordinals_per_layer_in_order() {
        let crs = crs();
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 48.5)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.1, y: 48.5)),
                attributes: Attributes::default(),
            },
        ];
        let (store, drops) = FeatureStore::ingest(raw, &crs);
        assert!(drops.is_empty());
        assert_eq!(store.len(), 2);
        assert!(store.get(&FeatureId::new(LayerKey::new("postes_source"), 0)).is_some());
        assert!(store.get(&FeatureId::new(LayerKey::new("postes_source"), 1)).is_some());
    }

    #[test]
    fn degenerate_linestring_is_dropped_not_fatal() {
        let crs = crs();
        let raw = vec![RawFeature {
            layer: LayerKey::new("reseau_bt"),
            geometry: Geom::LineString(LineString::from(vec![(0.0, 48.5)])),
            attributes: Attributes::default(),
        }];
        let (store, drops) = FeatureStore::ingest(raw, &crs);
        assert!(store.is_empty());
        assert_eq!(drops.len(), 1);
        assert!(matches!(drops[0], IngestDrop::DegenerateGeometry { .. }));
    }

    /// A two-point line whose coordinates coincide has only one distinct
    /// coordinate, which is degenerate the same way a one-point line is —
    /// unlike a closed ring with a third, distinct interior point.
    #[test]
    fn two_point_line_with_coincident_coordinates_is_dropped() {
        let crs = crs();
        let raw = vec![RawFeature {
            layer: LayerKey::new("reseau_bt"),
            geometry: Geom::LineString(LineString::from(vec![(1.0, 48.5), (1.0, 48.5)])),
            attributes: Attributes::default(),
        }];
        let (store, drops) = FeatureStore::ingest(raw, &crs);
        assert!(store.is_empty());
        assert_eq!(drops.len(), 1);
        assert!(matches!(drops[0], IngestDrop::DegenerateGeometry { .. }));
    }

    #[test]
    fn layer_iteration_only_yields_that_layers_features() {
        let crs = crs();
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 48.5)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::Point(point!(x: 0.0, y: 48.5)),
                attributes: Attributes::default(),
            },
        ];
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let count = store.layer(&LayerKey::new("postes_source")).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn index_order_is_stable_across_calls() {
        let crs = crs();
        let raw = (0..5)
            .map(|i| RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::Point(Point::new(i as f64 * 0.01, 48.5)),
                attributes: Attributes::default(),
            })
            .collect::<Vec<_>>();
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let a: Vec<_> = store.iter_in_index_order().map(|f| f.id.clone()).collect();
        let b: Vec<_> = store.iter_in_index_order().map(|f| f.id.clone()).collect();
        assert_eq!(a, b);
    }
}
