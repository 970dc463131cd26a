//! Fundamental value types shared by every Tessera crate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Caller-assigned identifier of an Input or Output layer.
pub type BindingId = i32;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit IEEE float.
    Float32,
    /// 16-bit IEEE half float.
    Float16,
    /// Asymmetric quantized unsigned 8-bit: `real = scale * (q - offset)`.
    QAsymmU8,
    /// 32-bit signed integer.
    Signed32,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Float32 | Self::Signed32 => 4,
            Self::Float16 => 2,
            Self::QAsymmU8 => 1,
        }
    }

    /// Whether values carry a quantization scale and offset.
    pub const fn is_quantized(self) -> bool {
        matches!(self, Self::QAsymmU8)
    }

    /// Whether this is a floating-point type.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float16)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float32 => "Float32",
            Self::Float16 => "Float16",
            Self::QAsymmU8 => "QAsymmU8",
            Self::Signed32 => "Signed32",
        };
        f.write_str(s)
    }
}

/// Ordered tensor dimensions. A dimension of `0` is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    dims: Vec<usize>,
}

impl TensorShape {
    /// Create a shape from its dimensions.
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    /// The dimensions, outermost first.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// True when the rank is at least one and no dimension is unknown.
    pub fn is_fully_specified(&self) -> bool {
        !self.dims.is_empty() && self.dims.iter().all(|&d| d > 0)
    }

    /// Product of all dimensions.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Product of all dimensions, or `None` if it does not fit in `usize`.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims }
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Tensor descriptor: shape, element type and quantization parameters.
///
/// Quantization parameters are only meaningful for quantized data types and
/// default to a scale of `0.0` and an offset of `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    shape: TensorShape,
    data_type: DataType,
    quantization_scale: f32,
    quantization_offset: i32,
}

impl TensorInfo {
    /// Create a descriptor without quantization parameters.
    pub fn new(shape: impl Into<TensorShape>, data_type: DataType) -> Self {
        Self {
            shape: shape.into(),
            data_type,
            quantization_scale: 0.0,
            quantization_offset: 0,
        }
    }

    /// Create a descriptor for a quantized tensor.
    pub fn new_quantized(
        shape: impl Into<TensorShape>,
        data_type: DataType,
        scale: f32,
        offset: i32,
    ) -> Self {
        Self {
            shape: shape.into(),
            data_type,
            quantization_scale: scale,
            quantization_offset: offset,
        }
    }

    /// Replace the quantization parameters.
    #[must_use]
    pub fn with_quantization(mut self, scale: f32, offset: i32) -> Self {
        self.quantization_scale = scale;
        self.quantization_offset = offset;
        self
    }

    /// Replace the shape, keeping type and quantization.
    #[must_use]
    pub fn with_shape(mut self, shape: impl Into<TensorShape>) -> Self {
        self.shape = shape.into();
        self
    }

    /// Tensor shape.
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Element type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Quantization scale.
    pub fn quantization_scale(&self) -> f32 {
        self.quantization_scale
    }

    /// Quantization zero point.
    pub fn quantization_offset(&self) -> i32 {
        self.quantization_offset
    }

    /// Number of elements described.
    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Byte footprint of a tensor with this descriptor.
    pub fn num_bytes(&self) -> usize {
        self.num_elements() * self.data_type.size_in_bytes()
    }

    /// Byte footprint, or `None` if it overflows.
    pub fn checked_num_bytes(&self) -> Option<usize> {
        self.shape
            .checked_num_elements()?
            .checked_mul(self.data_type.size_in_bytes())
    }

    /// True when element types agree; quantization parameters may differ.
    pub fn is_type_compatible(&self, other: &Self) -> bool {
        self.data_type == other.data_type
    }

    /// True when shape and element type agree; quantization may differ.
    pub fn is_shape_and_type_equal(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data_type == other.data_type
    }

    /// Check the descriptor's own invariants.
    ///
    /// Rank must be at least one, the byte size must be addressable, and
    /// quantized types need a finite, positive scale.
    pub fn check(&self) -> Result<()> {
        if self.shape.rank() == 0 {
            return Err(GraphError::InvalidTensorInfo(
                "tensor rank must be at least 1".to_string(),
            ));
        }
        if self.checked_num_bytes().is_none() {
            return Err(GraphError::InvalidTensorInfo(format!(
                "tensor {} is too large to address",
                self.shape
            )));
        }
        if self.data_type.is_quantized()
            && !(self.quantization_scale.is_finite() && self.quantization_scale > 0.0)
        {
            return Err(GraphError::InvalidTensorInfo(format!(
                "quantized tensor {} requires a positive scale, got {}",
                self.shape, self.quantization_scale
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.data_type, self.shape)?;
        if self.data_type.is_quantized() {
            write!(
                f,
                " (scale {}, offset {})",
                self.quantization_scale, self.quantization_offset
            )?;
        }
        Ok(())
    }
}

/// Stable handle of a layer inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    /// Arena index of the layer.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Well-known compute backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compute {
    /// Portable reference CPU implementation.
    CpuRef,
    /// Data-parallel CPU implementation.
    CpuAcc,
    /// GPU acceleration.
    GpuAcc,
}

impl Compute {
    /// Canonical backend name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CpuRef => "CpuRef",
            Self::CpuAcc => "CpuAcc",
            Self::GpuAcc => "GpuAcc",
        }
    }
}

/// Name of a compute backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BackendId(String);

impl BackendId {
    /// Create a backend id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Backend name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Compute> for BackendId {
    fn from(compute: Compute) -> Self {
        Self(compute.as_str().to_string())
    }
}

impl From<&str> for BackendId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl PartialEq<Compute> for BackendId {
    fn eq(&self, other: &Compute) -> bool {
        self.0 == other.as_str()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
