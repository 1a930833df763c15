#![doc = "Spatial connection engine and path finder for electrical distribution grids."]

mod config;
mod connections;
mod feature;
mod geom;
mod graph;
mod ids;
mod index;
mod pathfinder;
mod pipeline;
mod query;
mod rules;

#[doc(inline)]
pub use config::EngineConfig;

#[doc(inline)]
pub use connections::{connect_feature, ConnectionSet, FeatureDiagnostic};

#[doc(inline)]
pub use feature::{Attributes, Feature, FeatureStore, IngestDrop, RawFeature};

#[doc(inline)]
pub use geom::{distance_metric, endpoints, intersects_disk, Geom, MetricCrs};

#[doc(inline)]
pub use graph::Graph;

#[doc(inline)]
pub use ids::{FeatureId, LayerKey};

#[doc(inline)]
pub use index::SpatialIndex;

#[doc(inline)]
pub use pathfinder::{find_path, PathConfig, PathFailure, PathOutcome, PathSearchOutcome, PathStep};

#[doc(inline)]
pub use pipeline::{run as run_pipeline, CancellationToken, PipelineOutcome};

#[doc(inline)]
pub use query::{find_path_from_point, QueryOutcome, QueryResult};

#[doc(inline)]
pub use rules::{LayerRules, RadiusSymbol, RadiusTable, RulesTable, TargetRule};
