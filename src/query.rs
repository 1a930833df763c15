//! Query front-end (C8): point-in, path-out.

use ahash::AHashMap;
use geo::Point;
use serde_json::{json, Value};

use crate::connections::ConnectionSet;
use crate::feature::FeatureStore;
use crate::geom::MetricCrs;
use crate::graph::Graph;
use crate::ids::{FeatureId, LayerKey};
use crate::index::SpatialIndex;
use crate::pathfinder::{find_path, PathConfig, PathOutcome, PathSearchOutcome, PathStep};
use crate::pipeline::CancellationToken;

/// Layers searched for a query point's entry into the grid.
pub const LOW_VOLTAGE_LAYERS: [&str; 2] = ["reseau_bt", "reseau_souterrain_bt"];

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query_point: (f64, f64),
    pub closest_entry: Option<ClosestEntry>,
    pub outcome: QueryOutcome,
}

#[derive(Debug, Clone)]
pub struct ClosestEntry {
    pub id: FeatureId,
    pub layer: LayerKey,
    pub distance_m: f64,
}

#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Path(PathOutcome),
    NoPath { reason: String },
    NoEntryWithinCap,
    /// Distinct from every other outcome — never mixed with success.
    Cancelled,
}

/// `find_path_from_point(lon, lat)`: project the query point, locate nearby
/// low-voltage entries within `max_bt_distance_m`, and try C7 against each
/// in ascending distance order until one yields a path. `cancellation` is
/// forwarded to C7 and checked between its BFS frontiers; a cancellation
/// discards whatever candidate was in flight and reports `Cancelled`
/// instead of trying the remaining candidates.
#[allow(clippy::too_many_arguments)]
pub fn find_path_from_point(
    lon: f64,
    lat: f64,
    crs: &MetricCrs,
    store: &FeatureStore,
    index: &SpatialIndex,
    graph: &Graph,
    connections: &AHashMap<FeatureId, ConnectionSet>,
    source_layer: &LayerKey,
    max_bt_distance_m: f64,
    path_config: &PathConfig,
    cancellation: &CancellationToken,
) -> anyhow::Result<QueryResult> {
    let wgs84_geom = crate::geom::Geom::Point(Point::new(lon, lat));
    let metric = crate::geom::project_to_metric(&wgs84_geom, crs)?;
    let probe = metric.probe_point();

    let bt_layers: Vec<LayerKey> = LOW_VOLTAGE_LAYERS.iter().map(|l| LayerKey::new(*l)).collect();
    let candidates = index.nearest(store, probe, 20, Some(&bt_layers));
    let within_cap: Vec<(FeatureId, f64)> =
        candidates.into_iter().filter(|(_, d)| *d <= max_bt_distance_m).collect();

    let Some((closest_id, closest_distance)) = within_cap.first().cloned() else {
        return Ok(QueryResult {
            query_point: (lon, lat),
            closest_entry: None,
            outcome: QueryOutcome::NoEntryWithinCap,
        });
    };

    let closest_entry = Some(ClosestEntry {
        id: closest_id.clone(),
        layer: closest_id.layer.clone(),
        distance_m: closest_distance,
    });

    for (candidate_id, _) in &within_cap {
        match find_path(graph, connections, store, index, candidate_id, source_layer, path_config, cancellation) {
            PathSearchOutcome::Found(outcome) => {
                return Ok(QueryResult { query_point: (lon, lat), closest_entry, outcome: QueryOutcome::Path(outcome) });
            }
            PathSearchOutcome::Cancelled => {
                return Ok(QueryResult { query_point: (lon, lat), closest_entry, outcome: QueryOutcome::Cancelled });
            }
            PathSearchOutcome::NotFound(_) => continue,
        }
    }

    Ok(QueryResult {
        query_point: (lon, lat),
        closest_entry,
        outcome: QueryOutcome::NoPath { reason: "no path found from any candidate entry within cap".to_string() },
    })
}

/// Summary statistics over a resolved path: element count, distinct layers,
/// per-layer counts, and total bridge+edge length.
fn path_summary(steps: &[PathStep]) -> Value {
    let mut total_elements = 0usize;
    let mut layer_counts: AHashMap<LayerKey, usize> = AHashMap::new();
    let mut total_length_m = 0.0;

    for step in steps {
        match step {
            PathStep::Node { layer, .. } => {
                total_elements += 1;
                *layer_counts.entry(layer.clone()).or_insert(0) += 1;
            }
            PathStep::Bridge { length_m, .. } => total_length_m += length_m,
        }
    }

    let mut breakdown: Vec<(String, usize)> =
        layer_counts.iter().map(|(l, c)| (l.to_string(), *c)).collect();
    breakdown.sort();

    json!({
        "total_elements": total_elements,
        "unique_layers": layer_counts.len(),
        "layer_breakdown": breakdown.into_iter().collect::<std::collections::BTreeMap<_, _>>(),
        "total_length_m": total_length_m,
    })
}

fn step_to_json(step: &PathStep) -> Value {
    match step {
        PathStep::Node { id, layer } => json!({ "layer": layer.to_string(), "id": id.to_string() }),
        PathStep::Bridge { from, to, length_m } => {
            json!({ "bridge": format!("{from}->{to}"), "length_m": length_m })
        }
    }
}

impl QueryResult {
    /// The JSON document shape of §6: `query_point`, `closest_entry`,
    /// `path`, and `path_summary`, with `success`/`reason` per the error
    /// handling policy.
    pub fn to_json(&self) -> Value {
        let closest_entry = self.closest_entry.as_ref().map(|e| {
            json!({ "layer": e.layer.to_string(), "id": e.id.to_string(), "distance_m": e.distance_m })
        });

        match &self.outcome {
            QueryOutcome::Path(outcome) => json!({
                "success": true,
                "query_point": [self.query_point.0, self.query_point.1],
                "closest_entry": closest_entry,
                "path": outcome.steps.iter().map(step_to_json).collect::<Vec<_>>(),
                "path_summary": path_summary(&outcome.steps),
            }),
            QueryOutcome::NoPath { reason } => json!({
                "success": false,
                "reason": reason,
                "query_point": [self.query_point.0, self.query_point.1],
                "closest_entry": closest_entry,
            }),
            QueryOutcome::NoEntryWithinCap => json!({
                "success": false,
                "reason": "no entry within cap",
                "query_point": [self.query_point.0, self.query_point.1],
                "closest_entry": Value::Null,
            }),
            QueryOutcome::Cancelled => json!({
                "success": false,
                "cancelled": true,
                "reason": "cancelled",
                "query_point": [self.query_point.0, self.query_point.1],
                "closest_entry": closest_entry,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Attributes, RawFeature};
    use crate::geom::Geom;
    use geo::{point, LineString};

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn crs() -> MetricCrs {
        MetricCrs::from_bounds(geo::Rect::new(
            geo::Coord { x: -1.0, y: 48.0 },
            geo::Coord { x: 1.0, y: 49.0 },
        ))
        .unwrap()
    }

    fn id(layer: &str, n: u64) -> FeatureId {
        FeatureId::new(LayerKey::new(layer), n)
    }

    /// Scenario 4: query front-end path, two BT lines chained to a source.
    #[test]
    fn finds_path_through_nearest_entry_point() {
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::LineString(LineString::from(vec![(0.0, 0.0), (0.0, 0.00002)])),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::LineString(LineString::from(vec![(0.0, 0.00002), (0.0, 0.00004)])),
                attributes: Attributes::default(),
            },
        ];
        let crs = crs();
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);

        let source = id("postes_source", 0);
        let line1 = id("reseau_bt", 0);
        let line2 = id("reseau_bt", 1);
        let mut connections = AHashMap::new();
        connections.insert(
            line1.clone(),
            ConnectionSet { all: vec![source.clone(), line2.clone()], start: vec![source.clone()], end: vec![line2.clone()] },
        );
        connections.insert(
            line2.clone(),
            ConnectionSet { all: vec![line1.clone()], start: vec![line1.clone()], end: vec![] },
        );
        connections.insert(source.clone(), ConnectionSet::default());

        let graph = Graph::build(&connections, |fid| fid.layer.clone());
        let source_layer = LayerKey::new("postes_source");

        let result = find_path_from_point(
            0.0,
            0.000045,
            &crs,
            &store,
            &index,
            &graph,
            &connections,
            &source_layer,
            10_000.0,
            &PathConfig::default(),
            &token(),
        )
        .unwrap();

        assert!(matches!(result.outcome, QueryOutcome::Path(_)));
        let entry = result.closest_entry.unwrap();
        assert_eq!(entry.id, line2);
    }

    /// A cancellation signalled before the call short-circuits the candidate
    /// loop even though a path exists, reporting `Cancelled` rather than a
    /// path or a `NoPath`.
    #[test]
    fn cancelled_token_reports_cancelled_even_when_a_path_exists() {
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::LineString(LineString::from(vec![(0.0, 0.0), (0.0, 0.00002)])),
                attributes: Attributes::default(),
            },
        ];
        let crs = crs();
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);

        let source = id("postes_source", 0);
        let line1 = id("reseau_bt", 0);
        let mut connections = AHashMap::new();
        connections.insert(
            line1.clone(),
            ConnectionSet { all: vec![source.clone()], start: vec![source.clone()], end: vec![] },
        );
        connections.insert(source.clone(), ConnectionSet::default());

        let graph = Graph::build(&connections, |fid| fid.layer.clone());
        let source_layer = LayerKey::new("postes_source");

        let cancelled = token();
        cancelled.cancel();
        let result = find_path_from_point(
            0.0,
            0.00001,
            &crs,
            &store,
            &index,
            &graph,
            &connections,
            &source_layer,
            10_000.0,
            &PathConfig::default(),
            &cancelled,
        )
        .unwrap();

        assert!(matches!(result.outcome, QueryOutcome::Cancelled));
        let value = result.to_json();
        assert_eq!(value["success"], false);
        assert_eq!(value["cancelled"], true);
    }

    #[test]
    fn beyond_cap_reports_no_entry_within_cap() {
        let raw = vec![RawFeature {
            layer: LayerKey::new("reseau_bt"),
            geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
            attributes: Attributes::default(),
        }];
        let crs = crs();
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);
        let connections = AHashMap::new();
        let graph = Graph::build(&connections, |fid| fid.layer.clone());
        let source_layer = LayerKey::new("postes_source");

        let result = find_path_from_point(
            10.0,
            10.0,
            &crs,
            &store,
            &index,
            &graph,
            &connections,
            &source_layer,
            1.0,
            &PathConfig::default(),
            &token(),
        )
        .unwrap();

        assert!(matches!(result.outcome, QueryOutcome::NoEntryWithinCap));
        let value = result.to_json();
        assert_eq!(value["success"], false);
    }
}
