//! Typed tensor storage and caller-owned tensor bindings.
//!
//! [`TensorBuffer`] is the owned storage behind every workspace region.
//! [`ConstTensor`] and [`Tensor`] borrow caller memory for the duration of
//! one inference call.

use half::f16;

use crate::error::TensorError;
use crate::types::{BindingId, DataType, TensorInfo};

/// Quantize a real value to an asymmetric uint8, rounding half away from zero.
pub fn quantize_u8(value: f32, scale: f32, offset: i32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        ((value / scale).round() as i32).saturating_add(offset).clamp(0, 255) as u8
    }
}

/// Recover the real value of an asymmetric uint8.
#[allow(clippy::cast_precision_loss)]
pub fn dequantize_u8(value: u8, scale: f32, offset: i32) -> f32 {
    (i32::from(value) - offset) as f32 * scale
}

/// Owned, typed tensor storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorBuffer {
    /// 32-bit floats.
    Float32(Vec<f32>),
    /// 16-bit floats.
    Float16(Vec<f16>),
    /// Quantized uint8 values.
    QAsymmU8(Vec<u8>),
    /// 32-bit signed integers.
    Signed32(Vec<i32>),
}

impl Default for TensorBuffer {
    fn default() -> Self {
        Self::Float32(Vec::new())
    }
}

impl TensorBuffer {
    /// Zero-filled storage sized exactly for `info`.
    pub fn zeros(info: &TensorInfo) -> Self {
        let n = info.num_elements();
        match info.data_type() {
            DataType::Float32 => Self::Float32(vec![0.0; n]),
            DataType::Float16 => Self::Float16(vec![f16::ZERO; n]),
            DataType::QAsymmU8 => Self::QAsymmU8(vec![0; n]),
            DataType::Signed32 => Self::Signed32(vec![0; n]),
        }
    }

    /// Element type held.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float32(_) => DataType::Float32,
            Self::Float16(_) => DataType::Float16,
            Self::QAsymmU8(_) => DataType::QAsymmU8,
            Self::Signed32(_) => DataType::Signed32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Float16(v) => v.len(),
            Self::QAsymmU8(v) => v.len(),
            Self::Signed32(v) => v.len(),
        }
    }

    /// True when no elements are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the held data in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.data_type().size_in_bytes()
    }

    /// Float32 contents, if that is the element type.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable Float32 contents, if that is the element type.
    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            Self::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Quantized uint8 contents, if that is the element type.
    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            Self::QAsymmU8(v) => Some(v),
            _ => None,
        }
    }

    /// Signed32 contents, if that is the element type.
    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Self::Signed32(v) => Some(v),
            _ => None,
        }
    }

    /// Decode every element to `f32`, dequantizing with `info`'s parameters.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f32_vec(&self, info: &TensorInfo) -> Vec<f32> {
        match self {
            Self::Float32(v) => v.clone(),
            Self::Float16(v) => v.iter().map(|x| x.to_f32()).collect(),
            Self::QAsymmU8(v) => {
                let (scale, offset) = (info.quantization_scale(), info.quantization_offset());
                v.iter().map(|&q| dequantize_u8(q, scale, offset)).collect()
            }
            Self::Signed32(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// Encode `values` into this buffer's element type, quantizing with `info`.
    ///
    /// `values` must hold exactly [`len`](Self::len) elements.
    #[allow(clippy::cast_possible_truncation)]
    pub fn store_f32(&mut self, values: &[f32], info: &TensorInfo) -> Result<(), TensorError> {
        if values.len() != self.len() {
            return Err(self.mismatch(values.len(), DataType::Float32));
        }
        match self {
            Self::Float32(v) => v.copy_from_slice(values),
            Self::Float16(v) => {
                for (dst, &src) in v.iter_mut().zip(values) {
                    *dst = f16::from_f32(src);
                }
            }
            Self::QAsymmU8(v) => {
                let (scale, offset) = (info.quantization_scale(), info.quantization_offset());
                for (dst, &src) in v.iter_mut().zip(values) {
                    *dst = quantize_u8(src, scale, offset);
                }
            }
            Self::Signed32(v) => {
                for (dst, &src) in v.iter_mut().zip(values) {
                    *dst = src.round() as i32;
                }
            }
        }
        Ok(())
    }

    /// Copy another buffer of identical type and length into this one.
    pub fn copy_from(&mut self, src: &Self) -> Result<(), TensorError> {
        if src.len() != self.len() || src.data_type() != self.data_type() {
            return Err(self.mismatch(src.len(), src.data_type()));
        }
        match (self, src) {
            (Self::Float32(d), Self::Float32(s)) => d.copy_from_slice(s),
            (Self::Float16(d), Self::Float16(s)) => d.copy_from_slice(s),
            (Self::QAsymmU8(d), Self::QAsymmU8(s)) => d.copy_from_slice(s),
            (Self::Signed32(d), Self::Signed32(s)) => d.copy_from_slice(s),
            _ => unreachable!("element types compared above"),
        }
        Ok(())
    }

    /// Copy caller data into this buffer.
    pub fn copy_from_view(&mut self, src: &TensorView<'_>) -> Result<(), TensorError> {
        if src.len() != self.len() || src.data_type() != self.data_type() {
            return Err(self.mismatch(src.len(), src.data_type()));
        }
        match (self, src) {
            (Self::Float32(d), TensorView::Float32(s)) => d.copy_from_slice(s),
            (Self::Float16(d), TensorView::Float16(s)) => d.copy_from_slice(s),
            (Self::QAsymmU8(d), TensorView::QAsymmU8(s)) => d.copy_from_slice(s),
            (Self::Signed32(d), TensorView::Signed32(s)) => d.copy_from_slice(s),
            _ => unreachable!("element types compared above"),
        }
        Ok(())
    }

    /// Copy this buffer into caller memory.
    pub fn copy_to_view(&self, dst: &mut TensorViewMut<'_>) -> Result<(), TensorError> {
        if dst.len() != self.len() || dst.data_type() != self.data_type() {
            return Err(self.mismatch(dst.len(), dst.data_type()));
        }
        match (self, dst) {
            (Self::Float32(s), TensorViewMut::Float32(d)) => d.copy_from_slice(s),
            (Self::Float16(s), TensorViewMut::Float16(d)) => d.copy_from_slice(s),
            (Self::QAsymmU8(s), TensorViewMut::QAsymmU8(d)) => d.copy_from_slice(s),
            (Self::Signed32(s), TensorViewMut::Signed32(d)) => d.copy_from_slice(s),
            _ => unreachable!("element types compared above"),
        }
        Ok(())
    }

    fn mismatch(&self, actual_len: usize, actual_type: DataType) -> TensorError {
        TensorError::Mismatch {
            expected_len: self.len(),
            expected_type: self.data_type(),
            actual_len,
            actual_type,
        }
    }
}

impl From<Vec<f32>> for TensorBuffer {
    fn from(v: Vec<f32>) -> Self {
        Self::Float32(v)
    }
}

impl From<Vec<f16>> for TensorBuffer {
    fn from(v: Vec<f16>) -> Self {
        Self::Float16(v)
    }
}

impl From<Vec<u8>> for TensorBuffer {
    fn from(v: Vec<u8>) -> Self {
        Self::QAsymmU8(v)
    }
}

impl From<Vec<i32>> for TensorBuffer {
    fn from(v: Vec<i32>) -> Self {
        Self::Signed32(v)
    }
}

/// Borrowed, read-only caller data.
#[derive(Debug, Clone, Copy)]
pub enum TensorView<'a> {
    /// 32-bit floats.
    Float32(&'a [f32]),
    /// 16-bit floats.
    Float16(&'a [f16]),
    /// Quantized uint8 values.
    QAsymmU8(&'a [u8]),
    /// 32-bit signed integers.
    Signed32(&'a [i32]),
}

impl TensorView<'_> {
    /// Element type.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float32(_) => DataType::Float32,
            Self::Float16(_) => DataType::Float16,
            Self::QAsymmU8(_) => DataType::QAsymmU8,
            Self::Signed32(_) => DataType::Signed32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(s) => s.len(),
            Self::Float16(s) => s.len(),
            Self::QAsymmU8(s) => s.len(),
            Self::Signed32(s) => s.len(),
        }
    }

    /// True when the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Borrowed, writable caller memory.
#[derive(Debug)]
pub enum TensorViewMut<'a> {
    /// 32-bit floats.
    Float32(&'a mut [f32]),
    /// 16-bit floats.
    Float16(&'a mut [f16]),
    /// Quantized uint8 values.
    QAsymmU8(&'a mut [u8]),
    /// 32-bit signed integers.
    Signed32(&'a mut [i32]),
}

impl TensorViewMut<'_> {
    /// Element type.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float32(_) => DataType::Float32,
            Self::Float16(_) => DataType::Float16,
            Self::QAsymmU8(_) => DataType::QAsymmU8,
            Self::Signed32(_) => DataType::Signed32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(s) => s.len(),
            Self::Float16(s) => s.len(),
            Self::QAsymmU8(s) => s.len(),
            Self::Signed32(s) => s.len(),
        }
    }

    /// True when the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_view_from {
    ($ty:ty, $variant:ident) => {
        impl<'a> From<&'a [$ty]> for TensorView<'a> {
            fn from(s: &'a [$ty]) -> Self {
                Self::$variant(s)
            }
        }

        impl<'a> From<&'a Vec<$ty>> for TensorView<'a> {
            fn from(s: &'a Vec<$ty>) -> Self {
                Self::$variant(s.as_slice())
            }
        }

        impl<'a> From<&'a mut [$ty]> for TensorViewMut<'a> {
            fn from(s: &'a mut [$ty]) -> Self {
                Self::$variant(s)
            }
        }

        impl<'a> From<&'a mut Vec<$ty>> for TensorViewMut<'a> {
            fn from(s: &'a mut Vec<$ty>) -> Self {
                Self::$variant(s.as_mut_slice())
            }
        }
    };
}

impl_view_from!(f32, Float32);
impl_view_from!(f16, Float16);
impl_view_from!(u8, QAsymmU8);
impl_view_from!(i32, Signed32);

fn check_binding(info: &TensorInfo, len: usize, data_type: DataType) -> Result<(), TensorError> {
    if info.num_elements() != len || info.data_type() != data_type {
        return Err(TensorError::Mismatch {
            expected_len: info.num_elements(),
            expected_type: info.data_type(),
            actual_len: len,
            actual_type: data_type,
        });
    }
    Ok(())
}

/// Read-only caller tensor bound to a network input.
#[derive(Debug, Clone)]
pub struct ConstTensor<'a> {
    info: TensorInfo,
    data: TensorView<'a>,
}

impl<'a> ConstTensor<'a> {
    /// Bind `data` under descriptor `info`; element count and type must agree.
    pub fn new(info: TensorInfo, data: impl Into<TensorView<'a>>) -> Result<Self, TensorError> {
        let data = data.into();
        check_binding(&info, data.len(), data.data_type())?;
        Ok(Self { info, data })
    }

    /// Descriptor supplied by the caller.
    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    /// Borrowed data.
    pub fn data(&self) -> &TensorView<'a> {
        &self.data
    }
}

/// Writable caller tensor bound to a network output.
#[derive(Debug)]
pub struct Tensor<'a> {
    info: TensorInfo,
    data: TensorViewMut<'a>,
}

impl<'a> Tensor<'a> {
    /// Bind `data` under descriptor `info`; element count and type must agree.
    pub fn new(info: TensorInfo, data: impl Into<TensorViewMut<'a>>) -> Result<Self, TensorError> {
        let data = data.into();
        check_binding(&info, data.len(), data.data_type())?;
        Ok(Self { info, data })
    }

    /// Descriptor supplied by the caller.
    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    /// Borrowed data.
    pub fn data(&self) -> &TensorViewMut<'a> {
        &self.data
    }

    /// Mutable borrowed data.
    pub fn data_mut(&mut self) -> &mut TensorViewMut<'a> {
        &mut self.data
    }
}

/// Caller inputs for one inference call, keyed by Input layer binding id.
pub type InputTensors<'a> = Vec<(BindingId, ConstTensor<'a>)>;

/// Caller outputs for one inference call, keyed by Output layer binding id.
pub type OutputTensors<'a> = Vec<(BindingId, Tensor<'a>)>;
