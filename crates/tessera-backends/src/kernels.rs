//! Arithmetic shared by the CPU backends.

use tessera_core::TensorBuffer;

use crate::backend::{check_arity, Workload};
use crate::error::WorkloadError;

/// Elementwise binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Mul,
}

impl BinaryOp {
    pub(crate) fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Mul => a * b,
        }
    }

    pub(crate) fn apply_i32(self, a: i32, b: i32) -> i32 {
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Mul => a.wrapping_mul(b),
        }
    }
}

/// Softmax over consecutive rows of `row_len` elements, in place.
///
/// The row maximum is subtracted before exponentiation so large inputs
/// saturate instead of overflowing.
pub(crate) fn softmax_rows(values: &mut [f32], row_len: usize, beta: f32) {
    if row_len == 0 {
        return;
    }
    for row in values.chunks_mut(row_len) {
        // Shift by the largest scaled logit so every exponent is <= 0 for
        // either sign of beta.
        let max = row
            .iter()
            .map(|&x| x * beta)
            .fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for x in row.iter_mut() {
            *x = (*x * beta - max).exp();
            sum += *x;
        }
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}

/// Copies its single input to its single output. Backs MemCopy layers on
/// every CPU backend.
#[derive(Debug)]
pub(crate) struct CopyWorkload {
    name: String,
}

impl CopyWorkload {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Workload for CopyWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        inputs: &[&TensorBuffer],
        outputs: &mut [TensorBuffer],
    ) -> Result<(), WorkloadError> {
        check_arity("input", 1, inputs.len())?;
        check_arity("output", 1, outputs.len())?;
        outputs[0].copy_from(inputs[0])?;
        Ok(())
    }
}
