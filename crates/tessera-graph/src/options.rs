//! Optimizer configuration.

use serde::{Deserialize, Serialize};

/// Which side of a backend boundary runs the inserted copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversionPlacement {
    /// The copy runs on the producing layer's backend.
    #[default]
    Producer,
    /// The copy runs on the consuming layer's backend.
    Consumer,
}

/// Options controlling [`crate::Optimizer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    /// Backend assignment of inserted MemCopy layers.
    pub conversion_placement: ConversionPlacement,
}

impl OptimizerOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set where conversion layers run.
    #[must_use]
    pub fn with_conversion_placement(mut self, placement: ConversionPlacement) -> Self {
        self.conversion_placement = placement;
        self
    }
}
