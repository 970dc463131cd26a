//! Tessera Graph Optimizer
//!
//! Turns a validated [`tessera_core::Graph`] into an [`OptimizedNetwork`]
//! ready to load:
//! - **Backend assignment**: each compute layer goes to the first preferred
//!   backend that accepts its resolved descriptors
//! - **Partitioning**: connected same-backend layers form subgraphs
//! - **Conversion insertion**: a MemCopy is spliced into every edge that
//!   crosses a backend boundary
//!
//! ## Example
//!
//! ```rust
//! use tessera_backends::create_default_registry;
//! use tessera_core::{ActivationDescriptor, Compute, DataType, Graph, TensorInfo};
//! use tessera_graph::{Optimizer, OptimizerOptions};
//!
//! let mut graph = Graph::new();
//! let input = graph.add_input_layer(0, "input")?;
//! let relu = graph.add_activation_layer(ActivationDescriptor::relu6(), "relu");
//! let output = graph.add_output_layer(0, "output")?;
//! graph.connect(graph.output_slot(input, 0), graph.input_slot(relu, 0))?;
//! graph.connect(graph.output_slot(relu, 0), graph.input_slot(output, 0))?;
//! graph.set_tensor_info(graph.output_slot(input, 0), TensorInfo::new([8], DataType::Float32))?;
//!
//! let spec = create_default_registry()?.device_spec();
//! let network = Optimizer::new(OptimizerOptions::default())
//!     .optimize(&graph, &[Compute::CpuAcc.into(), Compute::CpuRef.into()], &spec)?;
//! assert_eq!(network.backend_of(relu), Some(&Compute::CpuAcc.into()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod network;
pub mod optimizer;
pub mod options;
pub mod partition;
pub mod passes;

pub use error::{OptimizeError, Result};
pub use network::{
    EdgeSummary, LayerSummary, NetworkStructure, OptimizationStats, OptimizedNetwork,
};
pub use optimizer::{optimize, Optimizer};
pub use options::{ConversionPlacement, OptimizerOptions};
pub use partition::{partition, BackendSubgraph};
pub use passes::{BackendAssignmentPass, ConversionInsertionPass, OptimizationPass, PassStats};
