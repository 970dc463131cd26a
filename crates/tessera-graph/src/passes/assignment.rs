use tessera_backends::DeviceSpec;
use tessera_core::{BackendId, Graph, GraphError, LayerId};
use tracing::{debug, trace, warn};

use super::{OptimizationPass, PassStats};
use crate::error::{OptimizeError, Result};

/// Assigns every compute layer to the first preferred backend that accepts
/// it with the layer's resolved descriptors.
///
/// Input and Output layers are left unassigned.
#[derive(Debug)]
pub struct BackendAssignmentPass<'a> {
    preferences: Vec<BackendId>,
    device_spec: &'a DeviceSpec,
}

impl<'a> BackendAssignmentPass<'a> {
    /// Build the pass from a preference list.
    ///
    /// Preferences absent from `device_spec` are dropped with a warning, as
    /// are repeats. Fails when nothing usable remains.
    pub fn new(preferences: &[BackendId], device_spec: &'a DeviceSpec) -> Result<Self> {
        let mut usable: Vec<BackendId> = Vec::with_capacity(preferences.len());
        for id in preferences {
            if !device_spec.contains(id) {
                warn!("Preferred backend {} is not available on this device", id);
            } else if !usable.contains(id) {
                usable.push(id.clone());
            }
        }
        if usable.is_empty() {
            return Err(OptimizeError::NoAvailableBackends {
                requested: preferences.to_vec(),
            });
        }
        Ok(Self {
            preferences: usable,
            device_spec,
        })
    }

    /// Preferences that survived filtering, in order.
    pub fn preferences(&self) -> &[BackendId] {
        &self.preferences
    }

    fn choose(&self, graph: &Graph, id: LayerId) -> Result<BackendId> {
        let layer = graph
            .layer(id)
            .ok_or_else(|| GraphError::InvalidLayer(format!("no layer {id}")))?;
        let (inputs, outputs) = graph.resolved_descriptors(id).ok_or_else(|| {
            GraphError::InvalidLayer(format!("layer '{}' has unresolved descriptors", layer.name()))
        })?;

        let mut reasons = Vec::new();
        for backend_id in &self.preferences {
            let Some(backend) = self.device_spec.get(backend_id) else {
                continue;
            };
            match backend.is_layer_supported(layer.kind(), &inputs, &outputs) {
                Ok(()) => return Ok(backend_id.clone()),
                Err(reason) => {
                    trace!("{} declined layer '{}': {}", backend_id, layer.name(), reason);
                    reasons.push(format!("{backend_id}: {reason}"));
                }
            }
        }

        Err(OptimizeError::UnsupportedLayer {
            layer: layer.name().to_string(),
            kind: layer.kind().type_name(),
            attempted: self.preferences.clone(),
            reasons,
        })
    }
}

impl OptimizationPass for BackendAssignmentPass<'_> {
    fn name(&self) -> &str {
        "BackendAssignment"
    }

    fn run(&self, graph: &mut Graph) -> Result<PassStats> {
        let mut stats = PassStats::default();

        let compute: Vec<LayerId> = graph
            .layers()
            .iter()
            .filter(|layer| layer.kind().is_compute())
            .map(|layer| layer.id())
            .collect();

        for id in compute {
            let backend = self.choose(graph, id)?;
            debug!("Assigned layer {} to {}", id, backend);
            graph.set_backend(id, backend)?;
            stats.layers_modified += 1;
        }

        debug!(
            "Backend assignment pass completed: {} layers assigned",
            stats.layers_modified
        );
        Ok(stats)
    }
}
