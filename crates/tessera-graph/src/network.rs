//! The immutable result of optimization.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::{BackendId, Graph, LayerId};

use crate::partition::BackendSubgraph;

/// Summary of one optimization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationStats {
    /// Compute layers assigned to each backend, conversions included.
    pub layers_per_backend: BTreeMap<BackendId, usize>,
    /// MemCopy layers added at backend boundaries.
    pub conversions_inserted: usize,
    /// Number of backend subgraphs in the final graph.
    pub subgraph_count: usize,
    /// Wall time spent optimizing.
    #[serde(skip)]
    pub elapsed: Duration,
}

/// One layer of an optimized network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// Layer id.
    pub id: LayerId,
    /// Layer name.
    pub name: String,
    /// Layer kind name.
    pub kind: String,
    /// Assigned backend; `None` for Input and Output layers.
    pub backend: Option<BackendId>,
}

/// One connection, as `(layer, slot)` on each end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeSummary {
    /// Producing layer and output slot.
    pub from: (LayerId, usize),
    /// Consuming layer and input slot.
    pub to: (LayerId, usize),
}

/// Comparable description of an optimized network's structure.
///
/// Two optimizations of the same graph with the same preferences and device
/// produce equal structures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStructure {
    /// Layers in id order.
    pub layers: Vec<LayerSummary>,
    /// Connections, sorted.
    pub edges: Vec<EdgeSummary>,
}

/// A validated graph whose compute layers all carry a backend, with
/// conversions inserted at every backend boundary.
///
/// Produced only by the optimizer and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct OptimizedNetwork {
    graph: Graph,
    subgraphs: Vec<BackendSubgraph>,
    stats: OptimizationStats,
}

impl OptimizedNetwork {
    pub(crate) fn new(
        graph: Graph,
        subgraphs: Vec<BackendSubgraph>,
        stats: OptimizationStats,
    ) -> Self {
        Self {
            graph,
            subgraphs,
            stats,
        }
    }

    /// The optimized graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Backend subgraphs, ordered by their smallest layer id.
    pub fn subgraphs(&self) -> &[BackendSubgraph] {
        &self.subgraphs
    }

    /// Backend a layer runs on.
    pub fn backend_of(&self, layer: LayerId) -> Option<&BackendId> {
        self.graph.layer(layer).and_then(|l| l.backend())
    }

    /// Statistics from the optimization run.
    pub fn stats(&self) -> &OptimizationStats {
        &self.stats
    }

    /// Layers and connections, for comparison and inspection.
    pub fn structure(&self) -> NetworkStructure {
        let layers = self
            .graph
            .layers()
            .iter()
            .map(|layer| LayerSummary {
                id: layer.id(),
                name: layer.name().to_string(),
                kind: layer.kind().type_name().to_string(),
                backend: layer.backend().cloned(),
            })
            .collect();

        let mut edges: Vec<EdgeSummary> = self
            .graph
            .layers()
            .iter()
            .flat_map(|layer| {
                (0..layer.num_input_slots()).filter_map(move |input| {
                    layer.input_connection(input).map(|from| EdgeSummary {
                        from,
                        to: (layer.id(), input),
                    })
                })
            })
            .collect();
        edges.sort();

        NetworkStructure { layers, edges }
    }
}
