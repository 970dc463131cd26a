//! The `CpuAcc` backend.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tessera_core::{BackendId, Compute, DataType, LayerKind, TensorInfo};
use tracing::{debug, info};

use super::workloads::{AccActivationWorkload, AccElementwiseWorkload};
use crate::backend::{check_capabilities, Backend, BackendCapabilities, Workload, WorkloadDescriptor};
use crate::error::{BackendError, Result};
use crate::kernels::{BinaryOp, CopyWorkload};

const KINDS: [&str; 4] = ["Activation", "Addition", "Multiplication", "MemCopy"];

/// Configuration for the `CpuAcc` backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuAccOptions {
    /// Number of worker threads (None = auto-detect).
    pub num_threads: Option<usize>,
    /// Prefix of worker thread names.
    pub thread_name_prefix: String,
    /// Smallest slice a worker processes; shorter tensors run on one thread.
    pub min_parallel_len: usize,
}

impl Default for CpuAccOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name_prefix: "tessera-cpuacc".to_string(),
            min_parallel_len: 4096,
        }
    }
}

impl CpuAccOptions {
    /// Set the number of worker threads.
    #[must_use]
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set the smallest per-worker slice.
    #[must_use]
    pub fn with_min_parallel_len(mut self, len: usize) -> Self {
        self.min_parallel_len = len.max(1);
        self
    }
}

/// Float32 elementwise kernels on a private thread pool.
pub struct CpuAccBackend {
    options: CpuAccOptions,
    pool: Arc<ThreadPool>,
}

impl std::fmt::Debug for CpuAccBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuAccBackend")
            .field("options", &self.options)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl CpuAccBackend {
    /// Create the backend with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(CpuAccOptions::default())
    }

    /// Create the backend with custom options.
    pub fn with_options(options: CpuAccOptions) -> Result<Self> {
        // Leave one core for the caller's thread.
        let num_threads = options
            .num_threads
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));

        let prefix = options.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |i| format!("{prefix}-worker-{i}"))
            .build()
            .map_err(|e| BackendError::ThreadPool(e.to_string()))?;

        info!("Created CpuAcc thread pool with {} threads", num_threads);
        Ok(Self {
            options,
            pool: Arc::new(pool),
        })
    }

    /// Options the backend was built with.
    pub fn options(&self) -> &CpuAccOptions {
        &self.options
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Backend for CpuAccBackend {
    fn id(&self) -> BackendId {
        Compute::CpuAcc.into()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            data_types: vec![DataType::Float32],
            layer_kinds: KINDS.iter().map(ToString::to_string).collect(),
            parallel: true,
        }
    }

    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> std::result::Result<(), String> {
        check_capabilities(Compute::CpuAcc.as_str(), &self.capabilities(), kind, inputs, outputs)
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

        debug!("CpuAcc creating {} workload for '{}'", kind.type_name(), layer_name);
        let name = layer_name.clone();
        let pool = Arc::clone(&self.pool);
        let min_len = self.options.min_parallel_len.max(1);
        let workload: Box<dyn Workload> = match kind {
            LayerKind::Activation(desc) => {
                Box::new(AccActivationWorkload::new(name, *desc, pool, min_len))
            }
            LayerKind::Addition => {
                Box::new(AccElementwiseWorkload::new(name, BinaryOp::Add, pool, min_len))
            }
            LayerKind::Multiplication => {
                Box::new(AccElementwiseWorkload::new(name, BinaryOp::Mul, pool, min_len))
            }
            LayerKind::MemCopy => Box::new(CopyWorkload::new(name)),
            other => {
                return Err(BackendError::UnsupportedLayer {
                    backend: self.id(),
                    kind: other.type_name(),
                    layer: layer_name.clone(),
                    reason: format!("CpuAcc does not implement {}", other.type_name()),
                })
            }
        };
        Ok(workload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::SoftmaxDescriptor;

    #[test]
    fn test_thread_pool_size() -> Result<()> {
        let backend = CpuAccBackend::with_options(CpuAccOptions::default().with_num_threads(2))?;
        assert_eq!(backend.num_threads(), 2);
        Ok(())
    }

    #[test]
    fn test_declines_non_float32() -> Result<()> {
        let backend = CpuAccBackend::with_options(CpuAccOptions::default().with_num_threads(1))?;
        let q = TensorInfo::new_quantized([4], DataType::QAsymmU8, 0.5, 0);
        let reason = backend
            .is_layer_supported(&LayerKind::Addition, &[q.clone(), q.clone()], &[q])
            .unwrap_err();
        assert!(reason.contains("QAsymmU8"));
        Ok(())
    }

    #[test]
    fn test_declines_softmax() -> Result<()> {
        let backend = CpuAccBackend::with_options(CpuAccOptions::default().with_num_threads(1))?;
        let info = TensorInfo::new([1, 5], DataType::Float32);
        let kind = LayerKind::Softmax(SoftmaxDescriptor::default());
        assert!(backend
            .is_layer_supported(&kind, &[info.clone()], &[info.clone()])
            .is_err());

        let descriptor = WorkloadDescriptor::new("softmax", kind, vec![info.clone()], vec![info]);
        assert!(matches!(
            backend.create_workload(&descriptor),
            Err(BackendError::UnsupportedLayer { kind: "Softmax", .. })
        ));
        Ok(())
    }

    #[test]
    fn test_options_from_json() -> std::result::Result<(), serde_json::Error> {
        let options: CpuAccOptions = serde_json::from_str(r#"{"num_threads":3}"#)?;
        assert_eq!(options.num_threads, Some(3));
        assert_eq!(options.min_parallel_len, 4096);
        Ok(())
    }
}
