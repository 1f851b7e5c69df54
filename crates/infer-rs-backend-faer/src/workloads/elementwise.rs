use faer::mat::{MatMut, MatRef};
use faer::{unzip, zip};
use infer_rs::backend::{
    BackendError, BackendResult, Support, WorkingMemDescriptor, Workload, WorkloadInfo,
    WorkloadRequest,
};
use infer_rs::graph::LayerKind;
use infer_rs::tensor::TensorInfo;
use infer_rs_backend_ref_cpu::workloads::BinaryOp;
use infer_rs_backend_ref_cpu::{Kernel, KernelWorkload};

use super::dense_types;

/// Same-shape binary elementwise operator, zipped over faer column views.
#[derive(Debug, Clone, Copy)]
pub struct FaerElementwise {
    pub op: BinaryOp,
}

impl Kernel for FaerElementwise {
    fn compute(&self, inputs: &[Vec<f32>], _: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let (lhs, rhs) = (&inputs[0], &inputs[1]);
        if lhs.len() != rhs.len() {
            return Err(BackendError::execution(format!(
                "elementwise operands hold {} and {} elements",
                lhs.len(),
                rhs.len()
            )));
        }
        let mut out = vec![0.0f32; lhs.len()];
        let len = out.len();
        let lhs = MatRef::from_column_major_slice(lhs.as_slice(), len, 1);
        let rhs = MatRef::from_column_major_slice(rhs.as_slice(), len, 1);
        let dst = MatMut::from_column_major_slice_mut(out.as_mut_slice(), len, 1);
        match self.op {
            BinaryOp::Add => zip!(dst, lhs, rhs).for_each(|unzip!(dst, a, b)| *dst = *a + *b),
            BinaryOp::Mul => zip!(dst, lhs, rhs).for_each(|unzip!(dst, a, b)| *dst = *a * *b),
        }
        Ok(vec![out])
    }
}

pub(crate) fn validate_elementwise(
    _: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    let out = outputs[0].shape();
    if inputs.iter().any(|info| info.shape() != out) {
        return Support::unsupported("broadcasting runs on the reference backend");
    }
    if inputs[1].data_type() != inputs[0].data_type() {
        return Support::malformed(format!(
            "inputs have different element types: {} and {}",
            inputs[0].data_type(),
            inputs[1].data_type()
        ));
    }
    dense_types(inputs).and_then(|| dense_types(outputs))
}

fn create(
    op: BinaryOp,
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    KernelWorkload::boxed(request, FaerElementwise { op }, memory)
}

pub(crate) fn create_addition(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    create(BinaryOp::Add, request, memory)
}

pub(crate) fn create_multiplication(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    create(BinaryOp::Mul, request, memory)
}
