//! Executes a loaded plan against caller tensors.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::{BindingId, InputTensors, OutputTensors, TensorInfo};
use tracing::trace;

use crate::error::{Result, RuntimeError};
use crate::plan::{Binding, BindingTable, ExecutionPlan};

impl BindingTable {
    /// Check every caller tensor before anything is written: each binding
    /// supplied exactly once with a matching element count and type.
    pub(crate) fn check(&self, inputs: &InputTensors<'_>, outputs: &OutputTensors<'_>) -> Result<()> {
        check_direction(
            "input",
            &self.inputs,
            inputs.iter().map(|(id, tensor)| (*id, tensor.info())),
        )?;
        check_direction(
            "output",
            &self.outputs,
            outputs.iter().map(|(id, tensor)| (*id, tensor.info())),
        )
    }
}

fn check_direction<'a>(
    direction: &'static str,
    table: &BTreeMap<BindingId, Binding>,
    supplied: impl Iterator<Item = (BindingId, &'a TensorInfo)>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (id, info) in supplied {
        let binding = table.get(&id).ok_or(RuntimeError::UnknownBinding {
            direction,
            binding: id,
        })?;
        if !seen.insert(id) {
            return Err(RuntimeError::Binding(format!(
                "{direction} binding {id} supplied more than once"
            )));
        }
        if info.num_elements() != binding.info.num_elements()
            || info.data_type() != binding.info.data_type()
        {
            return Err(RuntimeError::Binding(format!(
                "{direction} binding {id} ('{}') expects {} {} elements, got {} {}",
                binding.layer,
                binding.info.num_elements(),
                binding.info.data_type(),
                info.num_elements(),
                info.data_type()
            )));
        }
    }
    if let Some((missing, binding)) = table.iter().find(|(id, _)| !seen.contains(*id)) {
        return Err(RuntimeError::Binding(format!(
            "{direction} binding {missing} ('{}') not supplied",
            binding.layer
        )));
    }
    Ok(())
}

impl ExecutionPlan {
    /// Copy inputs in, run every workload in order, copy outputs out.
    ///
    /// Bindings must already have passed [`BindingTable::check`].
    pub(crate) fn run(
        &mut self,
        bindings: &BindingTable,
        inputs: &InputTensors<'_>,
        outputs: &mut OutputTensors<'_>,
    ) -> Result<()> {
        for (id, tensor) in inputs {
            let Some(binding) = bindings.inputs.get(id) else {
                continue;
            };
            self.workspace
                .region_mut(binding.region)
                .copy_from_view(tensor.data())
                .map_err(|err| RuntimeError::Binding(err.to_string()))?;
        }

        for entry in &self.entries {
            trace!("Executing layer {} ({})", entry.layer, entry.name);
            entry
                .execute(&mut self.workspace)
                .map_err(|err| RuntimeError::Execution {
                    layer: entry.name.clone(),
                    reason: err.to_string(),
                })?;
        }

        for (id, tensor) in outputs.iter_mut() {
            let Some(binding) = bindings.outputs.get(id) else {
                continue;
            };
            self.workspace
                .region(binding.region)
                .copy_to_view(tensor.data_mut())
                .map_err(|err| RuntimeError::Binding(err.to_string()))?;
        }
        Ok(())
    }
}
