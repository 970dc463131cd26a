//! Reference workloads.
//!
//! Every kernel decodes its inputs to `f32`, computes, and encodes the
//! result in the output's element type. Quantized outputs are requantized
//! with their own scale and offset.

use tessera_core::{
    ActivationDescriptor, ConstantDescriptor, DataType, TensorBuffer, TensorError, TensorInfo,
};

use crate::backend::{check_arity, Workload};
use crate::error::WorkloadError;
use crate::kernels::{softmax_rows, BinaryOp};

/// Elementwise activation.
#[derive(Debug)]
pub struct RefActivationWorkload {
    name: String,
    descriptor: ActivationDescriptor,
    input: TensorInfo,
    output: TensorInfo,
}

impl RefActivationWorkload {
    pub(crate) fn new(
        name: String,
        descriptor: ActivationDescriptor,
        input: TensorInfo,
        output: TensorInfo,
    ) -> Self {
        Self {
            name,
            descriptor,
            input,
            output,
        }
    }
}

impl Workload for RefActivationWorkload {
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
        let values: Vec<f32> = inputs[0]
            .to_f32_vec(&self.input)
            .into_iter()
            .map(|x| self.descriptor.apply(x))
            .collect();
        outputs[0].store_f32(&values, &self.output)?;
        Ok(())
    }
}

/// Elementwise addition or multiplication.
#[derive(Debug)]
pub struct RefElementwiseWorkload {
    name: String,
    op: BinaryOp,
    lhs: TensorInfo,
    rhs: TensorInfo,
    output: TensorInfo,
}

impl RefElementwiseWorkload {
    pub(crate) fn new(
        name: String,
        op: BinaryOp,
        lhs: TensorInfo,
        rhs: TensorInfo,
        output: TensorInfo,
    ) -> Self {
        Self {
            name,
            op,
            lhs,
            rhs,
            output,
        }
    }
}

impl Workload for RefElementwiseWorkload {
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

        // Integers stay exact rather than round-tripping through f32.
        if let (Some(a), Some(b), TensorBuffer::Signed32(out)) =
            (inputs[0].as_i32(), inputs[1].as_i32(), &mut outputs[0])
        {
            if let Some(&actual_len) = [a.len(), b.len()].iter().find(|&&n| n != out.len()) {
                return Err(TensorError::Mismatch {
                    expected_len: out.len(),
                    expected_type: DataType::Signed32,
                    actual_len,
                    actual_type: DataType::Signed32,
                }
                .into());
            }
            for ((dst, &x), &y) in out.iter_mut().zip(a).zip(b) {
                *dst = self.op.apply_i32(x, y);
            }
            return Ok(());
        }

        let a = inputs[0].to_f32_vec(&self.lhs);
        let b = inputs[1].to_f32_vec(&self.rhs);
        let values: Vec<f32> = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| self.op.apply(x, y))
            .collect();
        outputs[0].store_f32(&values, &self.output)?;
        Ok(())
    }
}

/// Softmax over the innermost dimension.
#[derive(Debug)]
pub struct RefSoftmaxWorkload {
    name: String,
    beta: f32,
    input: TensorInfo,
    output: TensorInfo,
}

impl RefSoftmaxWorkload {
    pub(crate) fn new(name: String, beta: f32, input: TensorInfo, output: TensorInfo) -> Self {
        Self {
            name,
            beta,
            input,
            output,
        }
    }
}

impl Workload for RefSoftmaxWorkload {
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
        let row_len = self.input.shape().dims().last().copied().unwrap_or(1);
        let mut values = inputs[0].to_f32_vec(&self.input);
        softmax_rows(&mut values, row_len, self.beta);
        outputs[0].store_f32(&values, &self.output)?;
        Ok(())
    }
}

/// Writes fixed weights.
#[derive(Debug)]
pub struct RefConstantWorkload {
    name: String,
    descriptor: ConstantDescriptor,
}

impl RefConstantWorkload {
    pub(crate) fn new(name: String, descriptor: ConstantDescriptor) -> Self {
        Self { name, descriptor }
    }
}

impl Workload for RefConstantWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        inputs: &[&TensorBuffer],
        outputs: &mut [TensorBuffer],
    ) -> Result<(), WorkloadError> {
        check_arity("input", 0, inputs.len())?;
        check_arity("output", 1, outputs.len())?;
        outputs[0].copy_from(self.descriptor.data())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantized_softmax_saturates() -> Result<(), WorkloadError> {
        let input = TensorInfo::new_quantized([1, 5], DataType::QAsymmU8, 10000.0, 100);
        let output = TensorInfo::new_quantized([1, 5], DataType::QAsymmU8, 1.0 / 255.0, 0);
        let workload = RefSoftmaxWorkload::new("softmax".into(), 1.0, input, output);

        let src = TensorBuffer::from(vec![1u8, 10, 3, 200, 5]);
        let mut outputs = vec![TensorBuffer::from(vec![0u8; 5])];
        workload.execute(&[&src], &mut outputs)?;
        assert_eq!(outputs[0].as_u8(), Some(&[0u8, 0, 0, 255, 0][..]));
        Ok(())
    }

    #[test]
    fn test_integer_addition_is_exact() -> Result<(), WorkloadError> {
        let info = TensorInfo::new([3], DataType::Signed32);
        let workload = RefElementwiseWorkload::new(
            "add".into(),
            BinaryOp::Add,
            info.clone(),
            info.clone(),
            info,
        );
        let a = TensorBuffer::from(vec![16_777_217, -4, 0]);
        let b = TensorBuffer::from(vec![1, 4, 7]);
        let mut outputs = vec![TensorBuffer::from(vec![0i32; 3])];
        workload.execute(&[&a, &b], &mut outputs)?;
        assert_eq!(outputs[0].as_i32(), Some(&[16_777_218, 0, 7][..]));
        Ok(())
    }

    #[test]
    fn test_activation_requantizes() -> Result<(), WorkloadError> {
        let input = TensorInfo::new_quantized([4], DataType::QAsymmU8, 0.5, 10);
        let output = TensorInfo::new_quantized([4], DataType::QAsymmU8, 0.25, 0);
        let workload =
            RefActivationWorkload::new("relu".into(), ActivationDescriptor::relu6(), input, output);
        // Real inputs: -5, 0, 2, 10
        let src = TensorBuffer::from(vec![0u8, 10, 14, 30]);
        let mut outputs = vec![TensorBuffer::from(vec![0u8; 4])];
        workload.execute(&[&src], &mut outputs)?;
        assert_eq!(outputs[0].as_u8(), Some(&[0u8, 0, 8, 24][..]));
        Ok(())
    }

    #[test]
    fn test_arity_checked() {
        let info = TensorInfo::new([2], DataType::Float32);
        let workload =
            RefSoftmaxWorkload::new("softmax".into(), 1.0, info.clone(), info);
        let mut outputs = vec![TensorBuffer::from(vec![0.0f32; 2])];
        assert!(matches!(
            workload.execute(&[], &mut outputs),
            Err(WorkloadError::Arity { direction: "input", .. })
        ));
    }
}
