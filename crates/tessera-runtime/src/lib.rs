//! Tessera Runtime
//!
//! Loads [`tessera_graph::OptimizedNetwork`]s and executes inference:
//! - **Loader**: builds an execution plan with one workload per compute
//!   layer and one workspace region per output slot
//! - **Engine**: checks caller bindings, runs the plan in topological
//!   order, copies results out
//! - **Runtime**: the thread-safe table of loaded networks, with
//!   diagnostics and per-network statistics
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_backends::create_default_registry;
//! use tessera_core::{ActivationDescriptor, Compute, ConstTensor, DataType, Graph, Tensor, TensorInfo};
//! use tessera_graph::{Optimizer, OptimizerOptions};
//! use tessera_runtime::{Runtime, RuntimeOptions, Status};
//!
//! let mut graph = Graph::new();
//! let input = graph.add_input_layer(0, "input")?;
//! let relu = graph.add_activation_layer(ActivationDescriptor::relu6(), "relu");
//! let output = graph.add_output_layer(0, "output")?;
//! graph.connect(graph.output_slot(input, 0), graph.input_slot(relu, 0))?;
//! graph.connect(graph.output_slot(relu, 0), graph.input_slot(output, 0))?;
//! let info = TensorInfo::new([4], DataType::Float32);
//! graph.set_tensor_info(graph.output_slot(input, 0), info.clone())?;
//!
//! let registry = Arc::new(create_default_registry()?);
//! let network = Optimizer::new(OptimizerOptions::default())
//!     .optimize(&graph, &[Compute::CpuRef.into()], &registry.device_spec())?;
//!
//! let runtime = Runtime::new(registry, RuntimeOptions::default());
//! let id = runtime.load_network(network)?;
//!
//! let src = vec![-1.0f32, 2.0, 7.0, 0.5];
//! let mut dst = vec![0.0f32; 4];
//! let inputs = vec![(0, ConstTensor::new(info.clone(), &src)?)];
//! let mut outputs = vec![(0, Tensor::new(info, &mut dst)?)];
//! assert_eq!(runtime.enqueue_workload(id, &inputs, &mut outputs), Status::Success);
//! drop(outputs);
//! assert_eq!(dst, vec![0.0, 2.0, 6.0, 0.5]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod engine;
pub mod error;
mod plan;
pub mod runtime;
pub mod statistics;
mod workspace;

pub use error::{Result, RuntimeError};
pub use runtime::{NetworkId, Runtime, RuntimeOptions, Status};
pub use statistics::NetworkStatistics;
