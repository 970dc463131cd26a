//! Tessera: a graph-optimizing neural network inference engine.
//!
//! Build a [`Graph`] of layers, let the [`Optimizer`] place each layer on
//! the best available backend, then load the [`OptimizedNetwork`] into a
//! [`Runtime`] and run inference on caller-owned tensors.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera::prelude::*;
//!
//! let mut graph = Graph::new();
//! let input = graph.add_input_layer(0, "input")?;
//! let softmax = graph.add_softmax_layer(SoftmaxDescriptor::default(), "softmax");
//! let output = graph.add_output_layer(0, "output")?;
//! graph.connect(graph.output_slot(input, 0), graph.input_slot(softmax, 0))?;
//! graph.connect(graph.output_slot(softmax, 0), graph.input_slot(output, 0))?;
//! let info = TensorInfo::new([1, 2], DataType::Float32);
//! graph.set_tensor_info(graph.output_slot(input, 0), info.clone())?;
//!
//! let registry = Arc::new(create_default_registry()?);
//! let preferences: [BackendId; 2] = [Compute::CpuAcc.into(), Compute::CpuRef.into()];
//! let network = Optimizer::default().optimize(&graph, &preferences, &registry.device_spec())?;
//! let runtime = Runtime::new(registry, RuntimeOptions::default());
//! let id = runtime.load_network(network)?;
//!
//! let src = vec![3.0f32, 3.0];
//! let mut dst = vec![0.0f32; 2];
//! let inputs = vec![(0, ConstTensor::new(info.clone(), &src)?)];
//! let mut outputs = vec![(0, Tensor::new(info, &mut dst)?)];
//! runtime.try_enqueue_workload(id, &inputs, &mut outputs)?;
//! drop(outputs);
//! assert_eq!(dst, vec![0.5, 0.5]);
//! # Ok::<(), tessera::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;

pub use error::{Error, Result};

pub use tessera_backends as backends;
pub use tessera_graph as graph;
pub use tessera_runtime as runtime;

pub use tessera_backends::{create_default_registry, Backend, BackendRegistry, DeviceSpec};
pub use tessera_core::{
    logging, ActivationDescriptor, ActivationFunction, BackendId, BindingId, Compute,
    ConstTensor, ConstantDescriptor, DataType, Graph, InputTensors, LayerId, OutputTensors,
    SoftmaxDescriptor, Tensor, TensorInfo, TensorShape,
};
pub use tessera_graph::{
    optimize, ConversionPlacement, OptimizedNetwork, Optimizer, OptimizerOptions,
};
pub use tessera_runtime::{NetworkId, NetworkStatistics, Runtime, RuntimeOptions, Status};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        create_default_registry, ActivationDescriptor, ActivationFunction, BackendId, Compute,
        ConstTensor, ConstantDescriptor, DataType, Graph, OptimizedNetwork, Optimizer,
        OptimizerOptions, Runtime, RuntimeOptions, SoftmaxDescriptor, Status, Tensor,
        TensorInfo,
    };
}
