//! The contract every compute backend implements.
//!
//! A backend answers two questions for the optimizer and the loader: can
//! it run a layer with the given descriptors, and if so, what workload
//! executes it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::{BackendId, DataType, LayerKind, TensorBuffer, TensorInfo};

use crate::error::{Result, WorkloadError};

/// Static description of what a backend can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Element types the backend's kernels accept.
    pub data_types: Vec<DataType>,
    /// Layer kind names the backend implements.
    pub layer_kinds: Vec<String>,
    /// Whether kernels run data-parallel.
    pub parallel: bool,
}

impl BackendCapabilities {
    /// True when `data_type` is accepted.
    pub fn supports_data_type(&self, data_type: DataType) -> bool {
        self.data_types.contains(&data_type)
    }

    /// True when the layer kind named `kind` is implemented.
    pub fn supports_kind(&self, kind: &str) -> bool {
        self.layer_kinds.iter().any(|k| k == kind)
    }
}

/// Everything a backend needs to build the workload for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadDescriptor {
    /// Name of the layer, for diagnostics.
    pub layer_name: String,
    /// Kind and parameters of the layer.
    pub kind: LayerKind,
    /// Resolved descriptors of the layer's inputs, in slot order.
    pub inputs: Vec<TensorInfo>,
    /// Resolved descriptors of the layer's outputs, in slot order.
    pub outputs: Vec<TensorInfo>,
}

impl WorkloadDescriptor {
    /// Create a descriptor.
    pub fn new(
        layer_name: impl Into<String>,
        kind: LayerKind,
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
    ) -> Self {
        Self {
            layer_name: layer_name.into(),
            kind,
            inputs,
            outputs,
        }
    }
}

/// An executable unit bound to one layer's descriptors.
///
/// Workloads read their inputs and write their outputs in place. They
/// hold no per-call state, so one instance may serve many calls.
pub trait Workload: Send + Sync + fmt::Debug {
    /// Name of the layer this workload executes.
    fn name(&self) -> &str;

    /// Run the layer over `inputs`, writing every buffer in `outputs`.
    fn execute(
        &self,
        inputs: &[&TensorBuffer],
        outputs: &mut [TensorBuffer],
    ) -> std::result::Result<(), WorkloadError>;
}

/// A compute backend.
pub trait Backend: Send + Sync {
    /// Identifier the backend registers under.
    fn id(&self) -> BackendId;

    /// What the backend can do.
    fn capabilities(&self) -> BackendCapabilities;

    /// Whether the backend can run `kind` with these resolved descriptors.
    ///
    /// The error carries a human-readable reason.
    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> std::result::Result<(), String>;

    /// Build the workload for one layer.
    fn create_workload(&self, descriptor: &WorkloadDescriptor) -> Result<Box<dyn Workload>>;
}

pub(crate) fn check_arity(
    direction: &'static str,
    expected: usize,
    actual: usize,
) -> std::result::Result<(), WorkloadError> {
    if expected == actual {
        Ok(())
    } else {
        Err(WorkloadError::Arity {
            direction,
            expected,
            actual,
        })
    }
}

/// Support check shared by the CPU backends: the kind must be listed and
/// every descriptor must use an accepted data type.
pub(crate) fn check_capabilities(
    backend: &str,
    capabilities: &BackendCapabilities,
    kind: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> std::result::Result<(), String> {
    if !capabilities.supports_kind(kind.type_name()) {
        return Err(format!("{backend} does not implement {}", kind.type_name()));
    }
    if let Some(info) = inputs
        .iter()
        .chain(outputs)
        .find(|info| !capabilities.supports_data_type(info.data_type()))
    {
        return Err(format!(
            "{backend} does not support data type {} for {}",
            info.data_type(),
            kind.type_name()
        ));
    }
    Ok(())
}
