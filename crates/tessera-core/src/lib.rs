//! Tessera Core
//!
//! This crate provides the foundational components of the Tessera inference
//! engine: tensor descriptors, typed tensor storage, the layer graph that
//! callers build networks with, and the validator that propagates tensor
//! descriptors through it.
//!
//! ## Architecture
//!
//! - **Types**: data types, shapes and tensor descriptors ([`TensorInfo`])
//! - **Tensor**: owned workspace storage and borrowed caller bindings
//! - **Layer**: the closed set of layer kinds and their shape rules
//! - **Graph**: an arena of layers connected through typed slots
//! - **Validator**: shape/type inference and consistency checks
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{DataType, Graph, TensorInfo};
//!
//! let mut graph = Graph::new();
//! let a = graph.add_input_layer(0, "a")?;
//! let b = graph.add_input_layer(1, "b")?;
//! let add = graph.add_addition_layer("add");
//! let out = graph.add_output_layer(0, "out")?;
//!
//! graph.connect(graph.output_slot(a, 0), graph.input_slot(add, 0))?;
//! graph.connect(graph.output_slot(b, 0), graph.input_slot(add, 1))?;
//! graph.connect(graph.output_slot(add, 0), graph.input_slot(out, 0))?;
//!
//! let info = TensorInfo::new([3, 4], DataType::Float32);
//! graph.set_tensor_info(graph.output_slot(a, 0), info.clone())?;
//! graph.set_tensor_info(graph.output_slot(b, 0), info.clone())?;
//!
//! graph.validate()?;
//! assert_eq!(graph.tensor_info(graph.output_slot(add, 0)), Some(&info));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod graph;
pub mod layer;
pub mod logging;
pub mod tensor;
pub mod types;
mod validator;

pub use error::{GraphError, Result, TensorError, ValidationIssue};
pub use graph::{Graph, GraphId, GraphStatistics, InputSlotRef, OutputSlotRef};
pub use layer::{
    ActivationDescriptor, ActivationFunction, ConstantDescriptor, Layer, LayerKind,
    SoftmaxDescriptor,
};
pub use tensor::{
    dequantize_u8, quantize_u8, ConstTensor, InputTensors, OutputTensors, Tensor, TensorBuffer,
    TensorView, TensorViewMut,
};
pub use types::{BackendId, BindingId, Compute, DataType, LayerId, TensorInfo, TensorShape};
pub use validator::ValidationSummary;
