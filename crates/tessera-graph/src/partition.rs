//! Grouping of assigned layers into per-backend subgraphs.

use serde::{Deserialize, Serialize};
use tessera_core::{BackendId, Graph, LayerId};

/// A maximal connected set of compute layers sharing one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSubgraph {
    /// Backend every layer in the group runs on.
    pub backend: BackendId,
    /// Member layers, ascending.
    pub layers: Vec<LayerId>,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so groups are keyed by their first layer.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Partition the assigned compute layers of `graph`.
///
/// Two layers share a group when an edge joins them and both run on the
/// same backend. Unassigned layers are skipped. Groups are ordered by their
/// smallest layer id.
pub fn partition(graph: &Graph) -> Vec<BackendSubgraph> {
    let layers = graph.layers();
    let mut sets = DisjointSet::new(layers.len());

    for layer in layers {
        let Some(backend) = layer.backend() else {
            continue;
        };
        for input in 0..layer.num_input_slots() {
            let Some((producer, _)) = layer.input_connection(input) else {
                continue;
            };
            let same_backend = graph
                .layer(producer)
                .and_then(|p| p.backend())
                .is_some_and(|b| b == backend);
            if same_backend {
                sets.union(producer.index(), layer.id().index());
            }
        }
    }

    let mut groups: Vec<BackendSubgraph> = Vec::new();
    let mut group_of_root: Vec<Option<usize>> = vec![None; layers.len()];
    for layer in layers {
        let Some(backend) = layer.backend() else {
            continue;
        };
        let root = sets.find(layer.id().index());
        match group_of_root[root] {
            Some(group) => groups[group].layers.push(layer.id()),
            None => {
                group_of_root[root] = Some(groups.len());
                groups.push(BackendSubgraph {
                    backend: backend.clone(),
                    layers: vec![layer.id()],
                });
            }
        }
    }
    groups
}
