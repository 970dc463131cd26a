use tessera_backends::DeviceSpec;
use tessera_core::{BackendId, Graph, GraphError, LayerId, LayerKind};
use tracing::debug;

use super::{OptimizationPass, PassStats};
use crate::error::{OptimizeError, Result};
use crate::options::ConversionPlacement;

/// An edge between compute layers assigned to different backends.
#[derive(Debug, Clone)]
struct Crossing {
    producer: LayerId,
    producer_backend: BackendId,
    consumer: LayerId,
    consumer_backend: BackendId,
    input_index: usize,
}

/// Splices a MemCopy layer into every edge whose endpoints run on
/// different backends.
///
/// Expects every compute layer to already carry a backend. The copy runs
/// on the side chosen by [`ConversionPlacement`], falling back to the other
/// side when that backend cannot copy the tensor.
#[derive(Debug)]
pub struct ConversionInsertionPass<'a> {
    placement: ConversionPlacement,
    device_spec: &'a DeviceSpec,
}

impl<'a> ConversionInsertionPass<'a> {
    /// Create the pass.
    pub fn new(placement: ConversionPlacement, device_spec: &'a DeviceSpec) -> Self {
        Self {
            placement,
            device_spec,
        }
    }

    fn crossings(graph: &Graph) -> Vec<Crossing> {
        let mut crossings = Vec::new();
        for layer in graph.layers() {
            if !layer.kind().is_compute() {
                continue;
            }
            let Some(consumer_backend) = layer.backend() else {
                continue;
            };
            for input_index in 0..layer.num_input_slots() {
                let Some((producer, _)) = layer.input_connection(input_index) else {
                    continue;
                };
                let Some(producer_layer) = graph.layer(producer) else {
                    continue;
                };
                if !producer_layer.kind().is_compute() {
                    continue;
                }
                let Some(producer_backend) = producer_layer.backend() else {
                    continue;
                };
                if producer_backend != consumer_backend {
                    crossings.push(Crossing {
                        producer,
                        producer_backend: producer_backend.clone(),
                        consumer: layer.id(),
                        consumer_backend: consumer_backend.clone(),
                        input_index,
                    });
                }
            }
        }
        crossings
    }

    fn place(&self, graph: &Graph, copy: LayerId, crossing: &Crossing) -> Result<BackendId> {
        let candidates = match self.placement {
            ConversionPlacement::Producer => {
                [&crossing.producer_backend, &crossing.consumer_backend]
            }
            ConversionPlacement::Consumer => {
                [&crossing.consumer_backend, &crossing.producer_backend]
            }
        };
        let (inputs, outputs) = graph.resolved_descriptors(copy).ok_or_else(|| {
            GraphError::InvalidLayer(format!("copy layer {copy} has unresolved descriptors"))
        })?;

        let mut reasons = Vec::new();
        for backend_id in candidates {
            let Some(backend) = self.device_spec.get(backend_id) else {
                reasons.push(format!("{backend_id}: not available"));
                continue;
            };
            match backend.is_layer_supported(&LayerKind::MemCopy, &inputs, &outputs) {
                Ok(()) => return Ok(backend_id.clone()),
                Err(reason) => reasons.push(format!("{backend_id}: {reason}")),
            }
        }

        let name = graph
            .layer(copy)
            .map(|layer| layer.name().to_string())
            .unwrap_or_default();
        Err(OptimizeError::UnsupportedLayer {
            layer: name,
            kind: LayerKind::MemCopy.type_name(),
            attempted: candidates.into_iter().cloned().collect(),
            reasons,
        })
    }
}

impl OptimizationPass for ConversionInsertionPass<'_> {
    fn name(&self) -> &str {
        "ConversionInsertion"
    }

    fn run(&self, graph: &mut Graph) -> Result<PassStats> {
        let mut stats = PassStats::default();

        for crossing in Self::crossings(graph) {
            let producer_name = graph.layer(crossing.producer).map_or("", |l| l.name());
            let consumer_name = graph.layer(crossing.consumer).map_or("", |l| l.name());
            let name = format!(
                "[ {producer_name} ({}) -> {consumer_name} ({}) ]",
                crossing.producer_backend, crossing.consumer_backend
            );

            let input = graph.input_slot(crossing.consumer, crossing.input_index);
            let copy = graph.insert_layer_on_connection(input, LayerKind::MemCopy, name)?;
            let backend = self.place(graph, copy, &crossing)?;
            debug!(
                "Inserted MemCopy {} on {} -> {} edge, running on {}",
                copy, crossing.producer, crossing.consumer, backend
            );
            graph.set_backend(copy, backend)?;
            stats.layers_inserted += 1;
        }

        debug!(
            "Conversion insertion pass completed: {} copies inserted",
            stats.layers_inserted
        );
        Ok(stats)
    }
}
