//! The `CpuRef` backend.

use tessera_core::{BackendId, Compute, DataType, LayerKind, TensorInfo};
use tracing::debug;

use super::workloads::{
    RefActivationWorkload, RefConstantWorkload, RefElementwiseWorkload, RefSoftmaxWorkload,
};
use crate::backend::{check_capabilities, Backend, BackendCapabilities, Workload, WorkloadDescriptor};
use crate::error::{BackendError, Result};
use crate::kernels::{BinaryOp, CopyWorkload};

const KINDS: [&str; 6] = [
    "Activation",
    "Addition",
    "Multiplication",
    "Softmax",
    "Constant",
    "MemCopy",
];

/// Scalar reference implementation of every layer kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuRefBackend;

impl CpuRefBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuRefBackend {
    fn id(&self) -> BackendId {
        Compute::CpuRef.into()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            data_types: vec![
                DataType::Float32,
                DataType::Float16,
                DataType::QAsymmU8,
                DataType::Signed32,
            ],
            layer_kinds: KINDS.iter().map(ToString::to_string).collect(),
            parallel: false,
        }
    }

    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> std::result::Result<(), String> {
        check_capabilities(Compute::CpuRef.as_str(), &self.capabilities(), kind, inputs, outputs)?;
        match kind {
            LayerKind::Activation(_) | LayerKind::Softmax(_)
                if inputs.iter().any(|i| i.data_type() == DataType::Signed32) =>
            {
                Err(format!("CpuRef has no integer {} kernel", kind.type_name()))
            }
            _ => Ok(()),
        }
    }

    fn create_workload(&self, descriptor: &WorkloadDescriptor) -> Result<Box<dyn Workload>> {
        let WorkloadDescriptor {
            layer_name,
            kind,
            inputs,
            outputs,
        } = descriptor;

        self.is_layer_supported(kind, inputs, outputs)
            .map_err(|reason| BackendError::UnsupportedLayer {
                backend: self.id(),
                kind: kind.type_name(),
                layer: layer_name.clone(),
                reason,
            })?;
        if inputs.len() != kind.num_inputs() || outputs.len() != kind.num_outputs() {
            return Err(BackendError::InvalidDescriptor(format!(
                "{} layer '{layer_name}' described with {} inputs and {} outputs",
                kind.type_name(),
                inputs.len(),
                outputs.len()
            )));
        }

        debug!("CpuRef creating {} workload for '{}'", kind.type_name(), layer_name);
        let name = layer_name.clone();
        let workload: Box<dyn Workload> = match kind {
            LayerKind::Activation(desc) => Box::new(RefActivationWorkload::new(
                name,
                *desc,
                inputs[0].clone(),
                outputs[0].clone(),
            )),
            LayerKind::Addition | LayerKind::Multiplication => {
                let op = if matches!(kind, LayerKind::Addition) {
                    BinaryOp::Add
                } else {
                    BinaryOp::Mul
                };
                Box::new(RefElementwiseWorkload::new(
                    name,
                    op,
                    inputs[0].clone(),
                    inputs[1].clone(),
                    outputs[0].clone(),
                ))
            }
            LayerKind::Softmax(desc) => Box::new(RefSoftmaxWorkload::new(
                name,
                desc.beta,
                inputs[0].clone(),
                outputs[0].clone(),
            )),
            LayerKind::Constant(desc) => Box::new(RefConstantWorkload::new(name, desc.clone())),
            LayerKind::MemCopy => Box::new(CopyWorkload::new(name)),
            LayerKind::Input { .. } | LayerKind::Output { .. } => {
                return Err(BackendError::InvalidDescriptor(format!(
                    "{} layer '{layer_name}' has no workload",
                    kind.type_name()
                )))
            }
        };
        Ok(workload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ActivationDescriptor, SoftmaxDescriptor, TensorBuffer};

    #[test]
    fn test_supports_every_data_type() {
        let backend = CpuRefBackend::new();
        for data_type in [DataType::Float32, DataType::Float16, DataType::QAsymmU8] {
            let info = if data_type.is_quantized() {
                TensorInfo::new_quantized([4], data_type, 0.1, 0)
            } else {
                TensorInfo::new([4], data_type)
            };
            assert!(backend
                .is_layer_supported(
                    &LayerKind::Softmax(SoftmaxDescriptor::default()),
                    &[info.clone()],
                    &[info]
                )
                .is_ok());
        }
        let ints = TensorInfo::new([4], DataType::Signed32);
        assert!(backend
            .is_layer_supported(&LayerKind::Addition, &[ints.clone(), ints.clone()], &[ints.clone()])
            .is_ok());
        assert!(backend
            .is_layer_supported(&LayerKind::Softmax(SoftmaxDescriptor::default()), &[ints.clone()], &[ints])
            .is_err());
    }

    #[test]
    fn test_creates_bounded_relu_workload() -> anyhow::Result<()> {
        let info = TensorInfo::new([10, 1], DataType::Float32);
        let descriptor = WorkloadDescriptor::new(
            "relu6",
            LayerKind::Activation(ActivationDescriptor::relu6()),
            vec![info.clone()],
            vec![info],
        );
        let workload = CpuRefBackend::new().create_workload(&descriptor)?;
        assert_eq!(workload.name(), "relu6");

        let src = TensorBuffer::from(vec![3.0f32, 5.0, 2.0, 3.0, 7.0, 0.0, -2.0, -1.0, 3.0, 3.0]);
        let mut outputs = vec![TensorBuffer::from(vec![0.0f32; 10])];
        workload.execute(&[&src], &mut outputs)?;
        assert_eq!(
            outputs[0].as_f32(),
            Some(&[3.0f32, 5.0, 2.0, 3.0, 6.0, 0.0, 0.0, 0.0, 3.0, 3.0][..])
        );
        Ok(())
    }

    #[test]
    fn test_rejects_io_layers() {
        let info = TensorInfo::new([1], DataType::Float32);
        let descriptor = WorkloadDescriptor::new(
            "in",
            LayerKind::Input { binding_id: 0 },
            Vec::new(),
            vec![info],
        );
        assert!(CpuRefBackend::new().create_workload(&descriptor).is_err());
    }
}
