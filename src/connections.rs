//! Connection engine (C5): the per-feature rule-directed candidate search.

use geo::Point;

use crate::feature::{Feature, FeatureStore};
use crate::geom::{self, Geom};
use crate::ids::FeatureId;
use crate::index::SpatialIndex;
use crate::rules::{LayerRules, RadiusSymbol, RadiusTable, RulesTable};

/// Output of C5 for one feature: three finite sets of feature ids.
///
/// `all ⊇ start ∪ end`; neither set ever contains the owning feature's own
/// id; for Point features `start` and `end` are always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSet {
    pub all: Vec<FeatureId>,
    pub start: Vec<FeatureId>,
    pub end: Vec<FeatureId>,
}

impl ConnectionSet {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// A feature whose connections could not be computed — the overall run still
/// succeeds per the per-feature compute failure policy; this is reported
/// alongside the (empty) `ConnectionSet` the driver emits for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDiagnostic {
    pub feature: FeatureId,
    pub reason: String,
}

/// One candidate drawn from the spatial index, refined to an exact distance.
#[derive(Debug, Clone)]
struct Candidate {
    id: FeatureId,
    distance: f64,
}

fn candidate_pool(
    store: &FeatureStore,
    index: &SpatialIndex,
    probe: Point<f64>,
    radius: f64,
    rules: &LayerRules,
    self_id: &FeatureId,
) -> Vec<Candidate> {
    let bbox = geom::buffer_bbox(probe, radius);
    index
        .query_bbox(bbox)
        .into_iter()
        .filter(|id| id != self_id)
        .filter_map(|id| {
            let feature = store.get(&id)?;
            if !rules.admits_layer(feature.layer()) {
                return None;
            }
            if !geom::intersects_disk(&feature.metric, probe, radius) {
                return None;
            }
            let distance = geom::distance_from_point(probe, &feature.metric);
            Some(Candidate { id, distance })
        })
        .collect()
}

/// Deterministic tie-break: ascending distance, then ascending rendered id.
fn best_by_distance_then_id(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap()
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    })
}

fn sorted_ids(mut candidates: Vec<Candidate>) -> Vec<FeatureId> {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap()
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    });
    candidates.into_iter().map(|c| c.id).collect()
}

/// Applies the solo / priority-mono / default rule cascade at a single
/// endpoint, returning the ids that endpoint connects to.
///
/// Order is fixed: solo first, priority second, matching the more recent
/// revisions of the system this engine is modeled on.
fn resolve_endpoint(
    store: &FeatureStore,
    index: &SpatialIndex,
    radii: &RadiusTable,
    rules: &LayerRules,
    self_id: &FeatureId,
    endpoint: Point<f64>,
) -> Vec<FeatureId> {
    let base_radius = radii.resolve(rules.base_radius);
    let pool = candidate_pool(store, index, endpoint, base_radius, rules, self_id);

    if !rules.solo_connection_if.is_empty() {
        let solo_radius = radii.resolve(rules.solo_radius.unwrap_or(rules.base_radius));
        let solo_pool: Vec<Candidate> = pool
            .iter()
            .filter(|c| {
                store
                    .get(&c.id)
                    .is_some_and(|f| rules.is_solo_layer(f.layer()) && c.distance <= solo_radius)
            })
            .cloned()
            .collect();
        if let Some(winner) = best_by_distance_then_id(&solo_pool) {
            return vec![winner.id.clone()];
        }
    }

    if rules.mono_per_endpoint && !rules.priority_connections.is_empty() {
        let priority_pool = |pool: &[Candidate]| -> Vec<(Candidate, i32)> {
            pool.iter()
                .filter_map(|c| {
                    let feature = store.get(&c.id)?;
                    let rule = rules.priority_rule_for(feature.layer())?;
                    let radius = radii.resolve(rule.radius);
                    (c.distance <= radius).then_some((c.clone(), rule.priority))
                })
                .collect()
        };

        let mut scored = priority_pool(&pool);
        if pool.is_empty() {
            // One optional retry at FAR, only when the base-radius probe
            // found nothing at all — a non-empty pool with no priority match
            // contributes ∅ rather than retrying.
            let far_pool = candidate_pool(store, index, endpoint, radii.resolve(RadiusSymbol::Far), rules, self_id);
            scored = priority_pool(&far_pool);
        }

        return scored
            .into_iter()
            .min_by(|(a, ap), (b, bp)| {
                ap.cmp(bp)
                    .then_with(|| a.distance.partial_cmp(&b.distance).unwrap())
                    .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
            })
            .map(|(c, _)| vec![c.id])
            .unwrap_or_default();
    }

    sorted_ids(pool)
}

/// Computes the `ConnectionSet` for one feature. Returns `Err` only on an
/// index-query failure (fatal for this feature per §7); a radius probe that
/// simply finds nothing is not an error.
pub fn connect_feature(
    store: &FeatureStore,
    index: &SpatialIndex,
    radii: &RadiusTable,
    rules_table: &RulesTable,
    feature: &Feature,
) -> ConnectionSet {
    let rules = match rules_table.get(feature.layer()) {
        Some(rules) => rules.clone(),
        None => LayerRules::default(),
    };

    match &feature.metric {
        Geom::Point(_) => {
            let probe = feature.metric.probe_point();
            let base_radius = radii.resolve(rules.base_radius);
            let pool = candidate_pool(store, index, probe, base_radius, &rules, &feature.id);
            ConnectionSet { all: sorted_ids(pool), start: Vec::new(), end: Vec::new() }
        }
        Geom::LineString(ls) => {
            let Some((start_pt, end_pt)) = geom::endpoints(ls) else {
                // Degenerate linestrings are dropped at ingest; this should
                // be unreachable, but an empty set is the safe fallback.
                return ConnectionSet::default();
            };
            let start = resolve_endpoint(store, index, radii, &rules, &feature.id, start_pt);
            let end = resolve_endpoint(store, index, radii, &rules, &feature.id, end_pt);

            let mut all: Vec<FeatureId> = start.iter().chain(end.iter()).cloned().collect();
            all.sort();
            all.dedup();

            ConnectionSet { all, start, end }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Attributes, RawFeature};
    use crate::geom::MetricCrs;
    use crate::ids::LayerKey;
    use crate::rules::{LayerKeyWire, TargetRule};
    use geo::{point, LineString};
    use std::collections::BTreeSet;

    fn crs() -> MetricCrs {
        MetricCrs::from_bounds(geo::Rect::new(
            geo::Coord { x: -1.0, y: 48.0 },
            geo::Coord { x: 1.0, y: 49.0 },
        ))
        .unwrap()
    }

    fn radii() -> RadiusTable {
        RadiusTable { close: 1.0, mid: 3.0, far: 10.0 }
    }

    /// Scenario 1: single source, one BT line at its door.
    #[test]
    fn priority_mono_connects_line_start_to_source() {
        let crs = crs();
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::LineString(LineString::from(vec![(0.0, 0.0), (0.0, 2.0)])),
                attributes: Attributes::default(),
            },
        ];
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);

        let mut bt_rules = LayerRules::default();
        bt_rules.mono_per_endpoint = true;
        bt_rules
            .priority_connections
            .insert(LayerKeyWire("postes_source".into()), TargetRule { priority: 1, radius: RadiusSymbol::Far });
        let mut rules_table = RulesTable::default();
        rules_table.insert(LayerKey::new("reseau_bt"), bt_rules);

        let line = store.get(&FeatureId::new(LayerKey::new("reseau_bt"), 0)).unwrap();
        let cs = connect_feature(&store, &index, &radii(), &rules_table, line);

        assert_eq!(cs.start, vec![FeatureId::new(LayerKey::new("postes_source"), 0)]);
        assert!(cs.end.is_empty());
        assert_eq!(cs.all, cs.start);
    }

    /// Scenario 2: solo rule wins over priority-mono when both match.
    #[test]
    fn solo_rule_takes_precedence_over_priority() {
        let crs = crs();
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("postes_electrique"),
                geometry: Geom::Point(point!(x: 0.0, y: 0.5)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_souterrain_hta"),
                geometry: Geom::LineString(LineString::from(vec![(0.0, 0.5), (0.0, 5.0)])),
                attributes: Attributes::default(),
            },
        ];
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);

        let mut hta_rules = LayerRules::default();
        hta_rules.mono_per_endpoint = true;
        hta_rules
            .priority_connections
            .insert(LayerKeyWire("postes_source".into()), TargetRule { priority: 1, radius: RadiusSymbol::Far });
        hta_rules.solo_connection_if = BTreeSet::from([
            LayerKeyWire("postes_source".into()),
            LayerKeyWire("postes_electrique".into()),
        ]);
        hta_rules.solo_radius = Some(RadiusSymbol::Far);
        let mut rules_table = RulesTable::default();
        rules_table.insert(LayerKey::new("reseau_souterrain_hta"), hta_rules);

        let line = store.get(&FeatureId::new(LayerKey::new("reseau_souterrain_hta"), 0)).unwrap();
        let cs = connect_feature(&store, &index, &radii(), &rules_table, line);

        assert_eq!(cs.start, vec![FeatureId::new(LayerKey::new("postes_electrique"), 0)]);
    }

    /// Scenario 3: exclude is honoured, yielding an empty connection set.
    #[test]
    fn exclude_connections_yields_empty_set() {
        let crs = crs();
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 0.00005, y: 0.0)),
                attributes: Attributes::default(),
            },
        ];
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);

        let mut rules = LayerRules::default();
        rules.exclude_connections = BTreeSet::from([
            LayerKeyWire("postes_source".into()),
            LayerKeyWire("postes_electrique".into()),
            LayerKeyWire("position_geographique".into()),
        ]);
        let mut rules_table = RulesTable::default();
        rules_table.insert(LayerKey::new("postes_source"), rules);

        for ordinal in 0..2 {
            let f = store.get(&FeatureId::new(LayerKey::new("postes_source"), ordinal)).unwrap();
            let cs = connect_feature(&store, &index, &radii(), &rules_table, f);
            assert!(cs.is_empty());
        }
    }

    #[test]
    fn self_is_never_a_candidate_for_itself() {
        let crs = crs();
        let raw = vec![RawFeature {
            layer: LayerKey::new("postes_source"),
            geometry: Geom::Point(point!(x: 0.0, y: 0.0)),
            attributes: Attributes::default(),
        }];
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);
        let rules_table = RulesTable::default();
        let f = store.get(&FeatureId::new(LayerKey::new("postes_source"), 0)).unwrap();
        let cs = connect_feature(&store, &index, &radii(), &rules_table, f);
        assert!(!cs.all.contains(&f.id));
    }

    /// A closed ring (first coordinate == last) still has a distinct interior
    /// coordinate, so it ingests as a valid LineString — but both endpoint
    /// probes land on the same point, so it is treated as a point per §8:
    /// `start == end`, same set either side would give a standalone Point.
    #[test]
    fn ring_with_coincident_endpoints_behaves_like_a_point_probe() {
        let crs = crs();
        let raw = vec![
            RawFeature {
                layer: LayerKey::new("postes_source"),
                geometry: Geom::Point(point!(x: 1.0, y: 1.0)),
                attributes: Attributes::default(),
            },
            RawFeature {
                layer: LayerKey::new("reseau_bt"),
                geometry: Geom::LineString(LineString::from(vec![
                    (1.0, 1.0),
                    (1.00002, 1.0),
                    (1.0, 1.0),
                ])),
                attributes: Attributes::default(),
            },
        ];
        let (store, _) = FeatureStore::ingest(raw, &crs);
        let index = SpatialIndex::build(&store);
        let rules_table = RulesTable::default();
        let line = store.get(&FeatureId::new(LayerKey::new("reseau_bt"), 0)).unwrap();
        let cs = connect_feature(&store, &index, &radii(), &rules_table, line);
        assert_eq!(cs.start, cs.end);
        assert_eq!(cs.all, cs.start);
        assert!(!cs.start.is_empty());
    }
}
