//! Rules model (C4): passive per-layer configuration consulted by the
//! connection engine. Deserialized from a JSON mapping of layer key to
//! [`LayerRules`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::LayerKey;

/// Symbolic radius tiers, resolved to meters by [`RadiusTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadiusSymbol {
    Close,
    Mid,
    Far,
}

impl Default for RadiusSymbol {
    fn default() -> Self {
        RadiusSymbol::Mid
    }
}

/// Scalar meters for the three symbolic radii, read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RadiusTable {
    pub close: f64,
    pub mid: f64,
    pub far: f64,
}

impl Default for RadiusTable {
    fn default() -> Self {
        Self { close: 1.0, mid: 3.0, far: 7.0 }
    }
}

impl RadiusTable {
    pub fn resolve(&self, symbol: RadiusSymbol) -> f64 {
        match symbol {
            RadiusSymbol::Close => self.close,
            RadiusSymbol::Mid => self.mid,
            RadiusSymbol::Far => self.far,
        }
    }
}

/// A per-target-layer priority or solo entry: `{priority, radius}`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TargetRule {
    pub priority: i32,
    pub radius: RadiusSymbol,
}

/// Full configuration for one source layer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LayerRules {
    #[serde(default = "default_base_radius")]
    pub base_radius: RadiusSymbol,
    #[serde(default)]
    pub exclude_connections: BTreeSet<LayerKeyWire>,
    #[serde(default)]
    pub priority_connections: BTreeMap<LayerKeyWire, TargetRule>,
    #[serde(default)]
    pub solo_connection_if: BTreeSet<LayerKeyWire>,
    #[serde(default)]
    pub solo_radius: Option<RadiusSymbol>,
    #[serde(default)]
    pub mono_per_endpoint: bool,
    #[serde(default)]
    pub allowed_targets: Option<BTreeSet<LayerKeyWire>>,
}

fn default_base_radius() -> RadiusSymbol {
    RadiusSymbol::Mid
}

/// `LayerKey` wraps an `Arc<str>`, which doesn't implement `Deserialize`
/// directly off a map key in the shape we need; this newtype gives rules
/// JSON a plain string key while the rest of the crate keeps using
/// `LayerKey` everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LayerKeyWire(pub String);

impl From<&LayerKeyWire> for LayerKey {
    fn from(value: &LayerKeyWire) -> Self {
        LayerKey::new(&value.0)
    }
}

impl From<&LayerKey> for LayerKeyWire {
    fn from(value: &LayerKey) -> Self {
        LayerKeyWire(value.as_str().to_string())
    }
}

impl LayerRules {
    /// Is `target` admissible at all, ignoring radius and priority? Positive
    /// `allowed_targets` overrides `exclude_connections` entirely.
    pub fn admits_layer(&self, target: &LayerKey) -> bool {
        match &self.allowed_targets {
            Some(allowed) => allowed.iter().any(|l| LayerKey::from(l) == *target),
            None => !self.exclude_connections.iter().any(|l| LayerKey::from(l) == *target),
        }
    }

    pub fn priority_rule_for(&self, target: &LayerKey) -> Option<TargetRule> {
        self.priority_connections
            .iter()
            .find(|(l, _)| LayerKey::from(*l) == *target)
            .map(|(_, rule)| *rule)
    }

    pub fn is_solo_layer(&self, target: &LayerKey) -> bool {
        self.solo_connection_if.iter().any(|l| LayerKey::from(l) == *target)
    }
}

/// The full mapping from layer key to [`LayerRules`], consumed by C5. A rule
/// whose referenced layer was never loaded is not an error here — the
/// connection engine simply never sees a candidate from that layer and the
/// rule has no effect; loaders are responsible for warning about the
/// dangling reference per the "missing reference" error kind.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesTable {
    #[serde(flatten)]
    rules: BTreeMap<LayerKeyWire, LayerRules>,
}

impl RulesTable {
    pub fn get(&self, layer: &LayerKey) -> Option<&LayerRules> {
        self.rules.iter().find(|(l, _)| LayerKey::from(*l) == *layer).map(|(_, r)| r)
    }

    pub fn insert(&mut self, layer: LayerKey, rules: LayerRules) {
        self.rules.insert(LayerKeyWire::from(&layer), rules);
    }
}
