//! Driver: wires C3 → C2 → C5 → C6, running the connection engine over a
//! fixed-size `rayon` pool with deterministic-by-input-order collection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::Result;
use rayon::prelude::*;

use crate::connections::{connect_feature, ConnectionSet, FeatureDiagnostic};
use crate::feature::{FeatureStore, RawFeature};
use crate::geom::MetricCrs;
use crate::graph::Graph;
use crate::ids::FeatureId;
use crate::index::SpatialIndex;
use crate::rules::{RadiusTable, RulesTable};

/// Cooperative cancellation flag, checked between chunks in C5 and between
/// BFS frontiers in C7. Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of running the connect→graph pipeline: either the completed graph
/// and connection map plus accumulated diagnostics, or a distinct cancelled
/// status never mixed with success.
pub enum PipelineOutcome {
    Completed {
        connections: AHashMap<FeatureId, ConnectionSet>,
        graph: Graph,
        diagnostics: Vec<FeatureDiagnostic>,
    },
    Cancelled,
}

/// Ingests `raw` into a [`FeatureStore`], builds the spatial index, runs C5
/// over chunks of `chunk_size` features on a pool of `worker_count` threads,
/// and folds the results into a [`Graph`].
///
/// Chunks are dispatched to the pool independently, but the driver always
/// collects results by iterating inputs in index order regardless of which
/// chunk a worker finishes first — the emitted mapping is a deterministic
/// function of the inputs, never of scheduling.
pub fn run(
    raw: impl IntoIterator<Item = RawFeature>,
    crs: &MetricCrs,
    radii: &RadiusTable,
    rules: &RulesTable,
    chunk_size: usize,
    worker_count: usize,
    cancellation: &CancellationToken,
) -> Result<(FeatureStore, PipelineOutcome)> {
    let (store, drops) = FeatureStore::ingest(raw, crs);
    log::info!("ingested {} features ({} dropped)", store.len(), drops.len());

    let index = SpatialIndex::build(&store);
    log::info!("spatial index built over {} features", store.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count.max(1))
        .build()?;

    let ordered: Vec<&crate::feature::Feature> = store.iter_in_index_order().collect();
    let mut connections: AHashMap<FeatureId, ConnectionSet> = AHashMap::with_capacity(ordered.len());
    let mut diagnostics = Vec::new();

    for chunk in ordered.chunks(chunk_size.max(1)) {
        if cancellation.is_cancelled() {
            return Ok((store, PipelineOutcome::Cancelled));
        }

        let chunk_results: Vec<(FeatureId, ConnectionSet)> = pool.install(|| {
            chunk
                .par_iter()
                .map(|feature| {
                    let cs = connect_feature(&store, &index, radii, rules, feature);
                    (feature.id.clone(), cs)
                })
                .collect()
        });

        for (id, cs) in chunk_results {
            if cs.is_empty() {
                diagnostics.push(FeatureDiagnostic { feature: id.clone(), reason: "empty connection set".to_string() });
            }
            connections.insert(id, cs);
        }
    }

    log::info!("connection engine completed for {} features", connections.len());

    let graph = Graph::build(&connections, |id| id.layer.clone());
    log::info!(
        "graph built: {} nodes, {} components",
        graph.node_count(),
        graph.components().1
    );

    Ok((store, PipelineOutcome::Completed { connections, graph, diagnostics }))
}
