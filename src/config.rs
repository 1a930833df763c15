//! Engine configuration: the scalar keys of the external interface, modeled
//! as a single struct with per-field defaults so a deployment only needs to
//! override what it cares about.

use serde::{Deserialize, Serialize};

use crate::pathfinder::PathConfig;
use crate::rules::RadiusTable;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub radius: RadiusTable,
    #[serde(default = "default_max_bt_distance_m")]
    pub max_bt_distance_m: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_bridge_cap_m")]
    pub bridge_cap_m: f64,
    #[serde(default = "default_multi_hop_bridge_cap_m")]
    pub multi_hop_bridge_cap_m: f64,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_exploration_limit")]
    pub exploration_limit: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_max_bt_distance_m() -> f64 {
    10_000.0
}
fn default_max_depth() -> usize {
    10
}
fn default_bridge_cap_m() -> f64 {
    2_000.0
}
fn default_multi_hop_bridge_cap_m() -> f64 {
    5_000.0
}
fn default_max_hops() -> usize {
    3
}
fn default_exploration_limit() -> usize {
    10_000
}
fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(16)
}
fn default_chunk_size() -> usize {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            radius: RadiusTable::default(),
            max_bt_distance_m: default_max_bt_distance_m(),
            max_depth: default_max_depth(),
            bridge_cap_m: default_bridge_cap_m(),
            multi_hop_bridge_cap_m: default_multi_hop_bridge_cap_m(),
            max_hops: default_max_hops(),
            exploration_limit: default_exploration_limit(),
            worker_count: default_worker_count(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl EngineConfig {
    pub fn path_config(&self) -> PathConfig {
        PathConfig {
            max_depth: self.max_depth,
            exploration_limit: self.exploration_limit,
            bridge_cap_m: self.bridge_cap_m,
            multi_hop_bridge_cap_m: self.multi_hop_bridge_cap_m,
            max_hops: self.max_hops,
        }
    }
}
