//! Path finder (C7): multi-strategy search from an origin feature to a
//! source substation, with proximity bridging across disconnected components.

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::connections::ConnectionSet;
use crate::feature::FeatureStore;
use crate::graph::Graph;
use crate::ids::{FeatureId, LayerKey};
use crate::index::SpatialIndex;
use crate::pipeline::CancellationToken;

/// One hop in a returned path: either a real graph edge or a synthetic
/// bridge the finder inserted to cross a gap between components.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    Node { id: FeatureId, layer: LayerKey },
    Bridge { from: FeatureId, to: FeatureId, length_m: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathOutcome {
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathFailure {
    pub reason: String,
    /// Longest prefix reaching the highest-priority layer seen, even though
    /// no strategy reached a source substation.
    pub best_partial: Vec<PathStep>,
}

/// Outcome of a cancellable path search: a path, a structured failure, or a
/// cancellation signal — distinct from both, never mixed with success.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSearchOutcome {
    Found(PathOutcome),
    NotFound(PathFailure),
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct PathConfig {
    pub max_depth: usize,
    pub exploration_limit: usize,
    pub bridge_cap_m: f64,
    pub multi_hop_bridge_cap_m: f64,
    pub max_hops: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            exploration_limit: 10_000,
            bridge_cap_m: 2_000.0,
            multi_hop_bridge_cap_m: 5_000.0,
            max_hops: 3,
        }
    }
}

type StopFn<'a> = dyn Fn(u32) -> bool + 'a;

/// Result of one `bfs` run: a found path, exhaustion without finding `stop`,
/// or cancellation partway through — checked once per dequeued frontier
/// node, between expanding each node's neighbors.
enum BfsStep {
    Found(Vec<u32>),
    NotFound,
    Cancelled,
}

/// BFS from `origin`, widened with the per-node `start`/`end` neighborhoods
/// in `connections` when present (strategy 2's fix for `all` sets that
/// accidentally dropped an endpoint neighbor). Stops at the first node
/// satisfying `stop`.
fn bfs(
    graph: &Graph,
    connections: Option<&AHashMap<FeatureId, ConnectionSet>>,
    origin: u32,
    exploration_limit: usize,
    max_depth: usize,
    cancellation: &CancellationToken,
    stop: &StopFn,
) -> BfsStep {
    let mut visited = vec![false; graph.node_count()];
    let mut parent = vec![u32::MAX; graph.node_count()];
    let mut depth = vec![0usize; graph.node_count()];
    let mut queue = VecDeque::from([origin]);
    visited[origin as usize] = true;
    let mut explored = 0usize;

    while let Some(u) = queue.pop_front() {
        if cancellation.is_cancelled() {
            return BfsStep::Cancelled;
        }
        explored += 1;
        if explored > exploration_limit {
            return BfsStep::NotFound;
        }
        if stop(u) {
            return BfsStep::Found(reconstruct(&parent, origin, u));
        }
        if depth[u as usize] >= max_depth {
            continue;
        }

        let mut expand = |v: u32| {
            if !visited[v as usize] {
                visited[v as usize] = true;
                parent[v as usize] = u;
                depth[v as usize] = depth[u as usize] + 1;
                queue.push_back(v);
            }
        };
        for &v in graph.neighbors(u) {
            expand(v);
        }
        if let Some(connections) = connections {
            if let Some(cs) = connections.get(graph.id_of(u)) {
                for id in cs.start.iter().chain(cs.end.iter()) {
                    if let Some(v) = graph.node_index(id) {
                        expand(v);
                    }
                }
            }
        }
    }
    BfsStep::NotFound
}

fn reconstruct(parent: &[u32], origin: u32, target: u32) -> Vec<u32> {
    let mut path = vec![target];
    let mut cur = target;
    while cur != origin {
        cur = parent[cur as usize];
        path.push(cur);
    }
    path.reverse();
    path
}

fn to_steps(graph: &Graph, path: &[u32]) -> Vec<PathStep> {
    path.iter()
        .map(|&n| PathStep::Node { id: graph.id_of(n).clone(), layer: graph.layer_of(n).clone() })
        .collect()
}

/// Every node's component contains a source-substation node?
fn components_with_source(graph: &Graph, components: &[u32], component_count: u32, source_layer: &LayerKey) -> Vec<bool> {
    let mut has_source = vec![false; component_count as usize];
    for n in 0..graph.node_count() as u32 {
        if graph.layer_of(n) == source_layer {
            has_source[components[n as usize] as usize] = true;
        }
    }
    has_source
}

/// Finds the metric-nearest pair `(u in component `from`, v in component
/// `to`)` within `cap_m`, breaking ties by ascending distance then by
/// rendered id pair — the same discipline C5 uses for candidate selection.
fn closest_bridge_to_component(
    graph: &Graph,
    components: &[u32],
    from: u32,
    to: u32,
    store: &FeatureStore,
    index: &SpatialIndex,
    cap_m: f64,
) -> Option<(u32, u32, f64)> {
    let mut best: Option<(u32, u32, f64)> = None;
    for node in 0..graph.node_count() as u32 {
        if components[node as usize] != from {
            continue;
        }
        let Some(feature) = store.get(graph.id_of(node)) else { continue };
        let probe = feature.metric.probe_point();
        for (candidate_id, distance) in index.nearest(store, probe, 16, None) {
            if distance > cap_m {
                continue;
            }
            let Some(candidate_node) = graph.node_index(&candidate_id) else { continue };
            if components[candidate_node as usize] != to {
                continue;
            }
            let candidate = (node, candidate_node, distance);
            best = Some(match &best {
                None => candidate,
                Some(current) if is_better_bridge(graph, &candidate, current) => candidate,
                Some(current) => *current,
            });
        }
    }
    best
}

fn is_better_bridge(graph: &Graph, a: &(u32, u32, f64), b: &(u32, u32, f64)) -> bool {
    if a.2 != b.2 {
        return a.2 < b.2;
    }
    let a_key = (graph.id_of(a.0).to_string(), graph.id_of(a.1).to_string());
    let b_key = (graph.id_of(b.0).to_string(), graph.id_of(b.1).to_string());
    a_key < b_key
}

/// Among all components in `candidate_targets`, the globally closest bridge
/// from `from_component`, if any is within `cap_m`.
fn closest_bridge_to_any(
    graph: &Graph,
    components: &[u32],
    from_component: u32,
    candidate_targets: impl Iterator<Item = u32>,
    store: &FeatureStore,
    index: &SpatialIndex,
    cap_m: f64,
) -> Option<(u32, u32, u32, f64)> {
    let mut best: Option<(u32, u32, u32, f64)> = None;
    for target in candidate_targets {
        if target == from_component {
            continue;
        }
        if let Some((from_node, to_node, dist)) =
            closest_bridge_to_component(graph, components, from_component, target, store, index, cap_m)
        {
            let candidate = (from_node, to_node, target, dist);
            best = Some(match &best {
                None => candidate,
                Some((bf, bt, _, bd)) if is_better_bridge(graph, &(from_node, to_node, dist), &(*bf, *bt, *bd)) => candidate,
                Some(current) => *current,
            });
        }
    }
    best
}

/// Runs all four strategies in order against `origin`, returning the first
/// success. `connections` supplies the `start`/`end` sets consulted by
/// strategy 2; `store`/`index` supply the metric geometry consulted by the
/// bridging strategies. `cancellation` is checked between every BFS
/// frontier; on cancellation the search stops immediately and reports
/// `Cancelled`, discarding whatever partial progress had been made.
pub fn find_path(
    graph: &Graph,
    connections: &AHashMap<FeatureId, ConnectionSet>,
    store: &FeatureStore,
    index: &SpatialIndex,
    origin: &FeatureId,
    source_layer: &LayerKey,
    config: &PathConfig,
    cancellation: &CancellationToken,
) -> PathSearchOutcome {
    let Some(origin_node) = graph.node_index(origin) else {
        return PathSearchOutcome::NotFound(PathFailure {
            reason: format!("unknown origin feature {origin}"),
            best_partial: Vec::new(),
        });
    };

    let is_source = |n: u32| graph.layer_of(n) == source_layer;

    // Strategy 1: direct BFS over `all`-derived adjacency only.
    match bfs(graph, None, origin_node, config.exploration_limit, config.max_depth, cancellation, &is_source) {
        BfsStep::Found(path) => return PathSearchOutcome::Found(PathOutcome { steps: to_steps(graph, &path) }),
        BfsStep::Cancelled => return PathSearchOutcome::Cancelled,
        BfsStep::NotFound => {}
    }

    // Strategy 2: endpoint-augmented BFS.
    match bfs(graph, Some(connections), origin_node, config.exploration_limit, config.max_depth, cancellation, &is_source) {
        BfsStep::Found(path) => return PathSearchOutcome::Found(PathOutcome { steps: to_steps(graph, &path) }),
        BfsStep::Cancelled => return PathSearchOutcome::Cancelled,
        BfsStep::NotFound => {}
    }

    let (components, component_count) = graph.components();
    let origin_component = components[origin_node as usize];
    let has_source = components_with_source(graph, &components, component_count, source_layer);

    if has_source[origin_component as usize] {
        // A source exists in this component but bounded BFS could not reach
        // it — bridging cannot help; report the deepest progress made.
        return match unreached_failure(graph, connections, origin_node, config, cancellation) {
            UnreachedOutcome::Failure(failure) => PathSearchOutcome::NotFound(failure),
            UnreachedOutcome::Cancelled => PathSearchOutcome::Cancelled,
        };
    }

    // Strategy 3: single-hop bridging to a component known to contain a source.
    let source_components = (0..component_count).filter(|&c| has_source[c as usize]);
    if let Some((from_node, to_node, _, dist)) =
        closest_bridge_to_any(graph, &components, origin_component, source_components, store, index, config.bridge_cap_m)
    {
        match complete_bridge(graph, connections, origin_node, from_node, to_node, dist, source_layer, config, cancellation) {
            BridgeStep::Found(outcome) => return PathSearchOutcome::Found(outcome),
            BridgeStep::Cancelled => return PathSearchOutcome::Cancelled,
            BridgeStep::NotFound => {}
        }
    }

    // Strategy 4: multi-hop bridging, chaining up to `max_hops` bridges
    // (each capped at the wider `multi_hop_bridge_cap_m`), landing anywhere
    // before checking for a source in the final component.
    match multi_hop_bridge(graph, connections, store, index, origin_node, source_layer, config, cancellation) {
        BridgeStep::Found(outcome) => return PathSearchOutcome::Found(outcome),
        BridgeStep::Cancelled => return PathSearchOutcome::Cancelled,
        BridgeStep::NotFound => {}
    }

    match unreached_failure(graph, connections, origin_node, config, cancellation) {
        UnreachedOutcome::Failure(failure) => PathSearchOutcome::NotFound(failure),
        UnreachedOutcome::Cancelled => PathSearchOutcome::Cancelled,
    }
}

/// Result of a bridging attempt: a completed path, no bridge found within
/// the search limits, or cancellation partway through one of its BFS legs.
enum BridgeStep {
    Found(PathOutcome),
    NotFound,
    Cancelled,
}

fn complete_bridge(
    graph: &Graph,
    connections: &AHashMap<FeatureId, ConnectionSet>,
    origin_node: u32,
    from_node: u32,
    to_node: u32,
    dist: f64,
    source_layer: &LayerKey,
    config: &PathConfig,
    cancellation: &CancellationToken,
) -> BridgeStep {
    let to_from = match bfs(graph, Some(connections), origin_node, config.exploration_limit, config.max_depth, cancellation, &|n| n == from_node) {
        BfsStep::Found(path) => path,
        BfsStep::NotFound => return BridgeStep::NotFound,
        BfsStep::Cancelled => return BridgeStep::Cancelled,
    };
    let is_source = |n: u32| graph.layer_of(n) == source_layer;
    let from_to_source = match bfs(graph, Some(connections), to_node, config.exploration_limit, config.max_depth, cancellation, &is_source) {
        BfsStep::Found(path) => path,
        BfsStep::NotFound => return BridgeStep::NotFound,
        BfsStep::Cancelled => return BridgeStep::Cancelled,
    };

    let mut steps = to_steps(graph, &to_from);
    steps.push(PathStep::Bridge { from: graph.id_of(from_node).clone(), to: graph.id_of(to_node).clone(), length_m: dist });
    // `from_to_source` starts at `to_node`, which the bridge step lands on —
    // it has not yet appeared as a `Node` step, so it is kept (not skipped).
    steps.extend(to_steps(graph, &from_to_source));
    BridgeStep::Found(PathOutcome { steps })
}

fn multi_hop_bridge(
    graph: &Graph,
    connections: &AHashMap<FeatureId, ConnectionSet>,
    store: &FeatureStore,
    index: &SpatialIndex,
    origin_node: u32,
    source_layer: &LayerKey,
    config: &PathConfig,
    cancellation: &CancellationToken,
) -> BridgeStep {
    let (components, component_count) = graph.components();
    let mut current = origin_node;
    let mut current_component = components[current as usize];
    let mut visited_components = vec![current_component];
    let mut steps = to_steps(graph, &[current]);

    for _ in 0..config.max_hops {
        let others = (0..component_count).filter(|c| !visited_components.contains(c));
        let Some((from_node, to_node, to_component, dist)) = closest_bridge_to_any(
            graph,
            &components,
            current_component,
            others,
            store,
            index,
            config.multi_hop_bridge_cap_m,
        ) else {
            return BridgeStep::NotFound;
        };

        let to_bridge_launch = match bfs(graph, Some(connections), current, config.exploration_limit, config.max_depth, cancellation, &|n| n == from_node) {
            BfsStep::Found(path) => path,
            BfsStep::NotFound => return BridgeStep::NotFound,
            BfsStep::Cancelled => return BridgeStep::Cancelled,
        };
        steps = {
            let mut prefix = steps[..steps.len() - 1].to_vec();
            prefix.extend(to_steps(graph, &to_bridge_launch));
            prefix.push(PathStep::Bridge { from: graph.id_of(from_node).clone(), to: graph.id_of(to_node).clone(), length_m: dist });
            prefix.push(PathStep::Node { id: graph.id_of(to_node).clone(), layer: graph.layer_of(to_node).clone() });
            prefix
        };

        current = to_node;
        current_component = to_component;
        visited_components.push(current_component);

        let is_source = |n: u32| graph.layer_of(n) == source_layer;
        match bfs(graph, Some(connections), current, config.exploration_limit, config.max_depth, cancellation, &is_source) {
            BfsStep::Found(final_leg) => {
                steps.extend(to_steps(graph, &final_leg).into_iter().skip(1));
                return BridgeStep::Found(PathOutcome { steps });
            }
            BfsStep::Cancelled => return BridgeStep::Cancelled,
            BfsStep::NotFound => {}
        }
    }
    BridgeStep::NotFound
}

/// Result of the best-partial-progress scan: a failure to report, or
/// cancellation partway through the scan itself.
enum UnreachedOutcome {
    Failure(PathFailure),
    Cancelled,
}

fn unreached_failure(
    graph: &Graph,
    connections: &AHashMap<FeatureId, ConnectionSet>,
    origin_node: u32,
    config: &PathConfig,
    cancellation: &CancellationToken,
) -> UnreachedOutcome {
    let mut visited = vec![false; graph.node_count()];
    let mut parent = vec![u32::MAX; graph.node_count()];
    let mut queue = VecDeque::from([origin_node]);
    visited[origin_node as usize] = true;
    let mut deepest = origin_node;
    let mut explored = 0usize;

    while let Some(u) = queue.pop_front() {
        if cancellation.is_cancelled() {
            return UnreachedOutcome::Cancelled;
        }
        explored += 1;
        if explored > config.exploration_limit {
            break;
        }
        deepest = u;
        let mut expand = |v: u32| {
            if !visited[v as usize] {
                visited[v as usize] = true;
                parent[v as usize] = u;
                queue.push_back(v);
            }
        };
        for &v in graph.neighbors(u) {
            expand(v);
        }
        if let Some(cs) = connections.get(graph.id_of(u)) {
            for id in cs.start.iter().chain(cs.end.iter()) {
                if let Some(v) = graph.node_index(id) {
                    expand(v);
                }
            }
        }
    }

    let path = reconstruct(&parent, origin_node, deepest);
    UnreachedOutcome::Failure(PathFailure {
        reason: "no source substation reachable within configured search limits".to_string(),
        best_partial: to_steps(graph, &path),
    })
}
