//! Stable identity for features and layers.
//!
//! A [`FeatureId`] is `(layer, ordinal)` rendered as `"<layer>_<n>"`. Ids are
//! assigned at ingest and never reused or renumbered; everything downstream
//! (index, connections, graph) addresses features by this key rather than by
//! position in any particular `Vec`.

use std::fmt;
use std::sync::Arc;

/// Interned layer name, e.g. `"postes_source"` or `"reseau_bt"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey(Arc<str>);

impl LayerKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: AsRef<str>> From<T> for LayerKey {
    fn from(value: T) -> Self {
        LayerKey::new(value)
    }
}

/// Globally unique feature identity: the layer it was ingested from plus an
/// ordinal assigned in ingest order within that layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub layer: LayerKey,
    pub ordinal: u64,
}

impl FeatureId {
    pub fn new(layer: LayerKey, ordinal: u64) -> Self {
        Self { layer, ordinal }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.layer, self.ordinal)
    }
}
