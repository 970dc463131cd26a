//! Layer kinds, their descriptors and per-kind shape rules.
//!
//! The set of layer kinds is closed: every kind answers the same fixed
//! questions (arity, input validation, output inference) through
//! [`LayerKind`]'s methods.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::tensor::TensorBuffer;
use crate::types::{BackendId, BindingId, DataType, LayerId, TensorInfo, TensorShape};

/// Elementwise activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationFunction {
    /// `1 / (1 + e^-x)`
    Sigmoid,
    /// `a * tanh(b * x)`
    TanH,
    /// `a * x + b`
    Linear,
    /// `max(0, x)`
    ReLu,
    /// `min(a, max(b, x))`
    BoundedReLu,
    /// `ln(1 + e^x)`
    SoftReLu,
    /// `x` when positive, otherwise `a * x`
    LeakyReLu,
    /// `|x|`
    Abs,
    /// `sqrt(x)`
    Sqrt,
    /// `x * x`
    Square,
}

/// Parameters of an Activation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationDescriptor {
    /// Function applied to every element.
    pub function: ActivationFunction,
    /// First parameter; meaning depends on `function`.
    pub a: f32,
    /// Second parameter; meaning depends on `function`.
    pub b: f32,
}

impl Default for ActivationDescriptor {
    fn default() -> Self {
        Self {
            function: ActivationFunction::Sigmoid,
            a: 0.0,
            b: 0.0,
        }
    }
}

impl ActivationDescriptor {
    /// Create a descriptor.
    pub fn new(function: ActivationFunction, a: f32, b: f32) -> Self {
        Self { function, a, b }
    }

    /// `min(upper, max(lower, x))`.
    pub fn bounded_relu(upper: f32, lower: f32) -> Self {
        Self::new(ActivationFunction::BoundedReLu, upper, lower)
    }

    /// Bounded ReLu clamped to `[0, 6]`.
    pub fn relu6() -> Self {
        Self::bounded_relu(6.0, 0.0)
    }

    /// Apply the function to one value.
    pub fn apply(&self, x: f32) -> f32 {
        let (a, b) = (self.a, self.b);
        match self.function {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::TanH => a * (b * x).tanh(),
            ActivationFunction::Linear => a * x + b,
            ActivationFunction::ReLu => x.max(0.0),
            ActivationFunction::BoundedReLu => a.min(b.max(x)),
            ActivationFunction::SoftReLu => x.exp().ln_1p(),
            ActivationFunction::LeakyReLu => {
                if x > 0.0 {
                    x
                } else {
                    a * x
                }
            }
            ActivationFunction::Abs => x.abs(),
            ActivationFunction::Sqrt => x.sqrt(),
            ActivationFunction::Square => x * x,
        }
    }
}

/// Parameters of a Softmax layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxDescriptor {
    /// Exponent scale applied before normalisation.
    pub beta: f32,
}

impl Default for SoftmaxDescriptor {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

/// Immutable weights held by a Constant layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDescriptor {
    info: TensorInfo,
    data: TensorBuffer,
}

impl ConstantDescriptor {
    /// Bind `data` to `info`. The descriptor must be valid and fully
    /// specified, and `data` must hold exactly its elements.
    pub fn new(info: TensorInfo, data: impl Into<TensorBuffer>) -> Result<Self> {
        let data = data.into();
        info.check()?;
        if !info.shape().is_fully_specified() {
            return Err(GraphError::InvalidTensorInfo(format!(
                "constant shape {} must be fully specified",
                info.shape()
            )));
        }
        if data.len() != info.num_elements() || data.data_type() != info.data_type() {
            return Err(GraphError::InvalidTensorInfo(format!(
                "constant data holds {} x {}, descriptor expects {info}",
                data.len(),
                data.data_type()
            )));
        }
        Ok(Self { info, data })
    }

    /// Descriptor of the weights.
    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    /// The weights.
    pub fn data(&self) -> &TensorBuffer {
        &self.data
    }
}

/// The closed set of layer kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Network input bound by the caller.
    Input {
        /// Caller-facing binding id.
        binding_id: BindingId,
    },
    /// Network output read back by the caller.
    Output {
        /// Caller-facing binding id.
        binding_id: BindingId,
    },
    /// Elementwise activation.
    Activation(ActivationDescriptor),
    /// Elementwise sum of two tensors.
    Addition,
    /// Elementwise product of two tensors.
    Multiplication,
    /// Softmax over the innermost dimension.
    Softmax(SoftmaxDescriptor),
    /// Weights fixed at construction.
    Constant(ConstantDescriptor),
    /// Copy between backends; only the optimizer creates these.
    MemCopy,
}

impl LayerKind {
    /// Short name of the kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Input { .. } => "Input",
            Self::Output { .. } => "Output",
            Self::Activation(_) => "Activation",
            Self::Addition => "Addition",
            Self::Multiplication => "Multiplication",
            Self::Softmax(_) => "Softmax",
            Self::Constant(_) => "Constant",
            Self::MemCopy => "MemCopy",
        }
    }

    /// Number of input slots.
    pub fn num_inputs(&self) -> usize {
        match self {
            Self::Input { .. } | Self::Constant(_) => 0,
            Self::Addition | Self::Multiplication => 2,
            Self::Output { .. } | Self::Activation(_) | Self::Softmax(_) | Self::MemCopy => 1,
        }
    }

    /// Number of output slots.
    pub fn num_outputs(&self) -> usize {
        match self {
            Self::Output { .. } => 0,
            _ => 1,
        }
    }

    /// True for every kind a backend has to execute.
    pub fn is_compute(&self) -> bool {
        !matches!(self, Self::Input { .. } | Self::Output { .. })
    }

    /// Binding id of Input and Output layers.
    pub fn binding_id(&self) -> Option<BindingId> {
        match self {
            Self::Input { binding_id } | Self::Output { binding_id } => Some(*binding_id),
            _ => None,
        }
    }

    /// Check resolved input descriptors against this kind's rules.
    pub fn validate_inputs(&self, inputs: &[TensorInfo]) -> std::result::Result<(), String> {
        if inputs.len() != self.num_inputs() {
            return Err(format!(
                "expected {} inputs, got {}",
                self.num_inputs(),
                inputs.len()
            ));
        }
        match self {
            Self::Addition | Self::Multiplication => {
                let (lhs, rhs) = (&inputs[0], &inputs[1]);
                if lhs.shape() != rhs.shape() {
                    return Err(format!(
                        "input shapes differ: {} vs {}",
                        lhs.shape(),
                        rhs.shape()
                    ));
                }
                if !lhs.is_type_compatible(rhs) {
                    return Err(format!(
                        "input data types differ: {} vs {}",
                        lhs.data_type(),
                        rhs.data_type()
                    ));
                }
                Ok(())
            }
            Self::Activation(_) => match inputs[0].data_type() {
                DataType::Signed32 => Err("activation requires a float or quantized input".into()),
                _ => Ok(()),
            },
            Self::Softmax(_) => {
                if inputs[0].shape().rank() == 0 {
                    return Err("softmax input must have rank >= 1".into());
                }
                match inputs[0].data_type() {
                    DataType::Signed32 => Err("softmax requires a float or quantized input".into()),
                    _ => Ok(()),
                }
            }
            Self::Input { .. } | Self::Output { .. } | Self::Constant(_) | Self::MemCopy => Ok(()),
        }
    }

    /// Output shapes implied by the input shapes.
    pub fn infer_output_shapes(&self, inputs: &[TensorShape]) -> Vec<TensorShape> {
        match self {
            Self::Input { .. } | Self::Output { .. } => Vec::new(),
            Self::Constant(desc) => vec![desc.info().shape().clone()],
            Self::Activation(_)
            | Self::Addition
            | Self::Multiplication
            | Self::Softmax(_)
            | Self::MemCopy => inputs.first().cloned().into_iter().collect(),
        }
    }

    /// Descriptors assigned to output slots the caller left unset.
    ///
    /// Outputs take the first input's type and quantization. Quantized
    /// Softmax produces probabilities, so it defaults to a scale of 1/256
    /// and an offset of 0.
    pub fn default_output_info(&self, inputs: &[TensorInfo]) -> Vec<TensorInfo> {
        let shapes: Vec<TensorShape> = inputs.iter().map(|i| i.shape().clone()).collect();
        let inferred = self.infer_output_shapes(&shapes);
        match self {
            Self::Constant(desc) => vec![desc.info().clone()],
            Self::Softmax(_) => inputs
                .first()
                .zip(inferred.into_iter().next())
                .map(|(input, shape)| {
                    let info = input.clone().with_shape(shape);
                    if input.data_type().is_quantized() {
                        info.with_quantization(1.0 / 256.0, 0)
                    } else {
                        info
                    }
                })
                .into_iter()
                .collect(),
            _ => inputs
                .first()
                .zip(inferred.into_iter().next())
                .map(|(input, shape)| input.clone().with_shape(shape))
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InputSlot {
    pub(crate) connection: Option<(LayerId, usize)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct OutputSlot {
    pub(crate) info: Option<TensorInfo>,
    pub(crate) connections: Vec<(LayerId, usize)>,
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) kind: LayerKind,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub(crate) backend: Option<BackendId>,
}

impl Layer {
    pub(crate) fn new(id: LayerId, kind: LayerKind, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inputs: vec![InputSlot::default(); kind.num_inputs()],
            outputs: vec![OutputSlot::default(); kind.num_outputs()],
            kind,
            backend: None,
        }
    }

    /// Handle of this layer.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Caller-supplied name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind and parameters.
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Number of input slots.
    pub fn num_input_slots(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output slots.
    pub fn num_output_slots(&self) -> usize {
        self.outputs.len()
    }

    /// Producer `(layer, output index)` feeding input slot `index`.
    pub fn input_connection(&self, index: usize) -> Option<(LayerId, usize)> {
        self.inputs.get(index).and_then(|slot| slot.connection)
    }

    /// Consumers `(layer, input index)` of output slot `index`.
    pub fn output_connections(&self, index: usize) -> &[(LayerId, usize)] {
        self.outputs
            .get(index)
            .map_or(&[], |slot| slot.connections.as_slice())
    }

    /// Descriptor of output slot `index`, once known.
    pub fn output_info(&self, index: usize) -> Option<&TensorInfo> {
        self.outputs.get(index).and_then(|slot| slot.info.as_ref())
    }

    /// Backend assigned by the optimizer.
    pub fn backend(&self) -> Option<&BackendId> {
        self.backend.as_ref()
    }
}
