//! Execution plans built from optimized networks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tessera_backends::{BackendRegistry, Workload, WorkloadDescriptor, WorkloadError};
use tessera_core::{BindingId, LayerId, LayerKind, TensorBuffer, TensorInfo};
use tessera_graph::OptimizedNetwork;
use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::workspace::{RegionId, TensorWorkspace};

/// A caller-visible tensor: an Input layer's output region or the region
/// feeding an Output layer.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) layer: String,
    pub(crate) region: RegionId,
    pub(crate) info: TensorInfo,
}

/// Binding tables of a loaded network. Fixed at load time.
#[derive(Debug, Default)]
pub(crate) struct BindingTable {
    pub(crate) inputs: BTreeMap<BindingId, Binding>,
    pub(crate) outputs: BTreeMap<BindingId, Binding>,
}

/// One compute layer, ready to run.
pub(crate) struct PlanEntry {
    pub(crate) layer: LayerId,
    pub(crate) name: String,
    pub(crate) workload: Box<dyn Workload>,
    pub(crate) inputs: Vec<RegionId>,
    pub(crate) outputs: Vec<RegionId>,
}

impl fmt::Debug for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanEntry")
            .field("layer", &self.layer)
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl PlanEntry {
    /// Run the workload against its workspace regions.
    ///
    /// Output regions are moved out for the call and put back when it ends,
    /// including by unwinding, so neither a failing nor a panicking workload
    /// leaves the workspace without its buffers.
    pub(crate) fn execute(
        &self,
        workspace: &mut TensorWorkspace,
    ) -> std::result::Result<(), WorkloadError> {
        let buffers = self.outputs.iter().map(|&r| workspace.take(r)).collect();
        let mut taken = TakenRegions {
            workspace,
            regions: &self.outputs,
            buffers,
        };
        let inputs: Vec<&TensorBuffer> = self
            .inputs
            .iter()
            .map(|&r| taken.workspace.region(r))
            .collect();
        self.workload.execute(&inputs, &mut taken.buffers)
    }
}

/// Output buffers on loan from a workspace; returned on drop.
struct TakenRegions<'a> {
    workspace: &'a mut TensorWorkspace,
    regions: &'a [RegionId],
    buffers: Vec<TensorBuffer>,
}

impl Drop for TakenRegions<'_> {
    fn drop(&mut self) {
        for (&region, buffer) in self.regions.iter().zip(self.buffers.drain(..)) {
            self.workspace.restore(region, buffer);
        }
    }
}

/// Workloads in topological order over a private workspace.
#[derive(Debug)]
pub(crate) struct ExecutionPlan {
    pub(crate) entries: Vec<PlanEntry>,
    pub(crate) workspace: TensorWorkspace,
}

/// Build the plan and binding tables for `network`, creating workloads
/// through `registry`.
pub(crate) fn build_plan(
    network: &OptimizedNetwork,
    registry: &BackendRegistry,
) -> Result<(ExecutionPlan, BindingTable)> {
    let graph = network.graph();
    let order = graph.topological_order()?;

    let mut workspace = TensorWorkspace::new();
    let mut regions: HashMap<(LayerId, usize), RegionId> = HashMap::new();
    let mut entries = Vec::new();
    let mut bindings = BindingTable::default();

    for id in order {
        let Some(layer) = graph.layer(id) else {
            continue;
        };
        let (input_infos, output_infos) =
            graph
                .resolved_descriptors(id)
                .ok_or_else(|| RuntimeError::Load {
                    layer: layer.name().to_string(),
                    backend: backend_name(layer.backend()),
                    reason: "unresolved tensor descriptors".to_string(),
                })?;

        let mut outputs = Vec::with_capacity(output_infos.len());
        for (slot, info) in output_infos.iter().enumerate() {
            let region = workspace.allocate(info);
            regions.insert((id, slot), region);
            outputs.push(region);
        }
        // Producers come first in topological order, so their regions exist.
        let inputs: Vec<RegionId> = (0..layer.num_input_slots())
            .filter_map(|slot| layer.input_connection(slot))
            .filter_map(|connection| regions.get(&connection).copied())
            .collect();

        match layer.kind() {
            LayerKind::Input { binding_id } => {
                bindings.inputs.insert(
                    *binding_id,
                    Binding {
                        layer: layer.name().to_string(),
                        region: outputs[0],
                        info: output_infos[0].clone(),
                    },
                );
            }
            LayerKind::Output { binding_id } => {
                bindings.outputs.insert(
                    *binding_id,
                    Binding {
                        layer: layer.name().to_string(),
                        region: inputs[0],
                        info: input_infos[0].clone(),
                    },
                );
            }
            kind => {
                let load_error = |reason: String| RuntimeError::Load {
                    layer: layer.name().to_string(),
                    backend: backend_name(layer.backend()),
                    reason,
                };
                let backend_id = layer
                    .backend()
                    .ok_or_else(|| load_error("no backend assigned".to_string()))?;
                let backend = registry
                    .get(backend_id)
                    .ok_or_else(|| load_error("backend is not registered".to_string()))?;
                let descriptor = WorkloadDescriptor::new(
                    layer.name(),
                    kind.clone(),
                    input_infos,
                    output_infos,
                );
                let workload = backend
                    .create_workload(&descriptor)
                    .map_err(|err| load_error(err.to_string()))?;
                debug!("Created {} workload for layer {} on {}", kind.type_name(), id, backend_id);

                entries.push(PlanEntry {
                    layer: id,
                    name: layer.name().to_string(),
                    workload,
                    inputs,
                    outputs,
                });
            }
        }
    }

    Ok((ExecutionPlan { entries, workspace }, bindings))
}

fn backend_name(backend: Option<&tessera_core::BackendId>) -> String {
    backend.map_or_else(|| "<unassigned>".to_string(), ToString::to_string)
}
