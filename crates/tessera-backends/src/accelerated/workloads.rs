//! Parallel Float32 workloads.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tessera_core::{ActivationDescriptor, DataType, TensorBuffer, TensorError};

use crate::backend::{check_arity, Workload};
use crate::error::WorkloadError;
use crate::kernels::BinaryOp;

fn f32_input(buffer: &TensorBuffer) -> Result<&[f32], WorkloadError> {
    buffer
        .as_f32()
        .ok_or_else(|| WorkloadError::UnsupportedDataType(buffer.data_type().to_string()))
}

fn f32_output(buffer: &mut TensorBuffer) -> Result<&mut [f32], WorkloadError> {
    let data_type = buffer.data_type();
    buffer
        .as_f32_mut()
        .ok_or_else(|| WorkloadError::UnsupportedDataType(data_type.to_string()))
}

fn check_len(expected: usize, actual: usize) -> Result<(), WorkloadError> {
    if expected == actual {
        return Ok(());
    }
    Err(TensorError::Mismatch {
        expected_len: expected,
        expected_type: DataType::Float32,
        actual_len: actual,
        actual_type: DataType::Float32,
    }
    .into())
}

/// Elementwise activation split across the pool.
pub struct AccActivationWorkload {
    name: String,
    descriptor: ActivationDescriptor,
    pool: Arc<ThreadPool>,
    min_len: usize,
}

impl std::fmt::Debug for AccActivationWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccActivationWorkload")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("min_len", &self.min_len)
            .finish_non_exhaustive()
    }
}

impl AccActivationWorkload {
    pub(crate) fn new(
        name: String,
        descriptor: ActivationDescriptor,
        pool: Arc<ThreadPool>,
        min_len: usize,
    ) -> Self {
        Self {
            name,
            descriptor,
            pool,
            min_len,
        }
    }
}

impl Workload for AccActivationWorkload {
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
        let src = f32_input(inputs[0])?;
        let dst = f32_output(&mut outputs[0])?;
        check_len(dst.len(), src.len())?;

        let descriptor = self.descriptor;
        self.pool.install(|| {
            dst.par_iter_mut()
                .zip(src.par_iter())
                .with_min_len(self.min_len)
                .for_each(|(d, &s)| *d = descriptor.apply(s));
        });
        Ok(())
    }
}

/// Elementwise addition or multiplication split across the pool.
pub struct AccElementwiseWorkload {
    name: String,
    op: BinaryOp,
    pool: Arc<ThreadPool>,
    min_len: usize,
}

impl std::fmt::Debug for AccElementwiseWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccElementwiseWorkload")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("min_len", &self.min_len)
            .finish_non_exhaustive()
    }
}

impl AccElementwiseWorkload {
    pub(crate) fn new(name: String, op: BinaryOp, pool: Arc<ThreadPool>, min_len: usize) -> Self {
        Self {
            name,
            op,
            pool,
            min_len,
        }
    }
}

impl Workload for AccElementwiseWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        inputs: &[&TensorBuffer],
        outputs: &mut [TensorBuffer],
    ) -> Result<(), WorkloadError> {
        check_arity("input", 2, inputs.len())?;
        check_arity("output", 1, outputs.len())?;
        let lhs = f32_input(inputs[0])?;
        let rhs = f32_input(inputs[1])?;
        let dst = f32_output(&mut outputs[0])?;
        check_len(dst.len(), lhs.len())?;
        check_len(dst.len(), rhs.len())?;

        let op = self.op;
        self.pool.install(|| {
            dst.par_iter_mut()
                .zip(lhs.par_iter().zip(rhs.par_iter()))
                .with_min_len(self.min_len)
                .for_each(|(d, (&a, &b))| *d = op.apply(a, b));
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::ThreadPoolBuilder;

    fn pool() -> Arc<ThreadPool> {
        Arc::new(ThreadPoolBuilder::new().num_threads(2).build().unwrap())
    }

    #[test]
    fn test_parallel_addition() -> Result<(), WorkloadError> {
        let workload = AccElementwiseWorkload::new("add".into(), BinaryOp::Add, pool(), 1);
        let a = TensorBuffer::from((1..=12).map(|x| x as f32).collect::<Vec<_>>());
        let b = TensorBuffer::from((1..=12).map(|x| (x * 100) as f32).collect::<Vec<_>>());
        let mut outputs = vec![TensorBuffer::from(vec![0.0f32; 12])];
        workload.execute(&[&a, &b], &mut outputs)?;

        let expected: Vec<f32> = (1..=12).map(|x| (x * 101) as f32).collect();
        assert_eq!(outputs[0].as_f32(), Some(expected.as_slice()));
        Ok(())
    }

    #[test]
    fn test_parallel_activation_matches_scalar() -> Result<(), WorkloadError> {
        let descriptor = ActivationDescriptor::bounded_relu(5.0, 2.0);
        let workload = AccActivationWorkload::new("act".into(), descriptor, pool(), 3);
        let input: Vec<f32> = (0..1000).map(|i| (i as f32).sin() * 10.0).collect();
        let src = TensorBuffer::from(input.clone());
        let mut outputs = vec![TensorBuffer::from(vec![0.0f32; 1000])];
        workload.execute(&[&src], &mut outputs)?;

        let expected: Vec<f32> = input.iter().map(|&x| descriptor.apply(x)).collect();
        assert_eq!(outputs[0].as_f32(), Some(expected.as_slice()));
        Ok(())
    }

    #[test]
    fn test_rejects_quantized_buffers() {
        let workload = AccElementwiseWorkload::new("mul".into(), BinaryOp::Mul, pool(), 1);
        let a = TensorBuffer::from(vec![1u8, 2]);
        let mut outputs = vec![TensorBuffer::from(vec![0u8; 2])];
        assert!(matches!(
            workload.execute(&[&a, &a], &mut outputs),
            Err(WorkloadError::UnsupportedDataType(_))
        ));
    }
}
