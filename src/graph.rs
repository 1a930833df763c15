//! Graph model (C6): undirected adjacency folded from connection sets.

use ahash::AHashMap;
use std::collections::VecDeque;

use crate::connections::ConnectionSet;
use crate::ids::{FeatureId, LayerKey};

/// Undirected, simple graph over feature ids. Built once from a completed
/// mapping of `FeatureId -> ConnectionSet` and never mutated afterward — the
/// graph is derived, not authoritative; rebuild it from connection sets
/// rather than persist and trust an edge table.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<FeatureId>,
    index: AHashMap<FeatureId, u32>,
    layers: Vec<LayerKey>,
    adjacency: Vec<Vec<u32>>,
}

impl Graph {
    /// Fold `connections` into a symmetric adjacency. For each `(u, v)` in
    /// `u`'s `all` set, an edge is inserted; a second pass adds the reverse
    /// direction wherever it was missing, so `v ∈ adj(u) ↔ u ∈ adj(v)` holds
    /// even though C5 only ever walks outward from one endpoint at a time.
    pub fn build(connections: &AHashMap<FeatureId, ConnectionSet>, layer_of: impl Fn(&FeatureId) -> LayerKey) -> Self {
        let mut nodes: Vec<FeatureId> = connections.keys().cloned().collect();
        nodes.sort();

        let index: AHashMap<FeatureId, u32> = nodes.iter().enumerate().map(|(i, id)| (id.clone(), i as u32)).collect();
        let layers: Vec<LayerKey> = nodes.iter().map(&layer_of).collect();
        let mut adjacency: Vec<AHashMap<u32, ()>> = vec![AHashMap::new(); nodes.len()];

        for (u_id, cs) in connections {
            let Some(&u) = index.get(u_id) else { continue };
            for v_id in &cs.all {
                let Some(&v) = index.get(v_id) else { continue };
                if u == v {
                    continue;
                }
                adjacency[u as usize].insert(v, ());
                adjacency[v as usize].insert(u, ());
            }
        }

        let adjacency = adjacency
            .into_iter()
            .map(|m| {
                let mut v: Vec<u32> = m.into_keys().collect();
                v.sort_unstable();
                v
            })
            .collect();

        Self { nodes, index, layers, adjacency }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_index(&self, id: &FeatureId) -> Option<u32> {
        self.index.get(id).copied()
    }

    pub fn id_of(&self, node: u32) -> &FeatureId {
        &self.nodes[node as usize]
    }

    pub fn layer_of(&self, node: u32) -> &LayerKey {
        &self.layers[node as usize]
    }

    pub fn neighbors(&self, node: u32) -> &[u32] {
        &self.adjacency[node as usize]
    }

    pub fn is_adjacent(&self, u: u32, v: u32) -> bool {
        self.adjacency[u as usize].binary_search(&v).is_ok()
    }

    /// Connected-component id for every node, and the number of components.
    /// Exposed for diagnostics; not required for path-finding correctness.
    pub fn components(&self) -> (Vec<u32>, u32) {
        let mut component = vec![u32::MAX; self.nodes.len()];
        let mut count = 0u32;
        for start in 0..self.nodes.len() {
            if component[start] != u32::MAX {
                continue;
            }
            let mut queue = VecDeque::from([start as u32]);
            component[start] = count;
            while let Some(u) = queue.pop_front() {
                for &v in self.neighbors(u) {
                    if component[v as usize] == u32::MAX {
                        component[v as usize] = count;
                        queue.push_back(v);
                    }
                }
            }
            count += 1;
        }
        (component, count)
    }

    pub fn largest_component_size(&self) -> usize {
        let (component, count) = self.components();
        (0..count)
            .map(|c| component.iter().filter(|&&x| x == c).count())
            .max()
            .unwrap_or(0)
    }
}
