use infer_rs::backend::{
    BackendError, BackendResult, Support, WorkingMemDescriptor, Workload, WorkloadInfo,
    WorkloadRequest,
};
use infer_rs::graph::{broadcast_shape, LayerKind};
use infer_rs::tensor::TensorInfo;

use super::{numeric_types, strides, Kernel, KernelWorkload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Mul,
}

impl BinaryOp {
    fn apply(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Mul => lhs * rhs,
        }
    }
}

/// Binary elementwise operator with same-rank broadcasting over unit extents.
#[derive(Debug, Clone, Copy)]
pub struct Elementwise {
    pub op: BinaryOp,
}

impl Kernel for Elementwise {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let out_dims = info.outputs[0].shape().dims();
        let lhs_dims = info.inputs[0].shape().dims();
        let rhs_dims = info.inputs[1].shape().dims();
        let (lhs, rhs) = (&inputs[0], &inputs[1]);

        if lhs_dims == out_dims && rhs_dims == out_dims {
            return Ok(vec![lhs
                .iter()
                .zip(rhs)
                .map(|(&a, &b)| self.op.apply(a, b))
                .collect()]);
        }

        let out_strides = strides(out_dims);
        let lhs_strides = strides(lhs_dims);
        let rhs_strides = strides(rhs_dims);
        let count = info.outputs[0].num_elements();
        let mut result = Vec::with_capacity(count);
        for flat in 0..count {
            let (mut lhs_index, mut rhs_index) = (0, 0);
            for axis in 0..out_dims.len() {
                let coord = (flat / out_strides[axis]) % out_dims[axis];
                if lhs_dims[axis] != 1 {
                    lhs_index += coord * lhs_strides[axis];
                }
                if rhs_dims[axis] != 1 {
                    rhs_index += coord * rhs_strides[axis];
                }
            }
            result.push(self.op.apply(lhs[lhs_index], rhs[rhs_index]));
        }
        Ok(vec![result])
    }
}

pub(crate) fn validate_elementwise(
    _: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    if inputs[0].data_type() != inputs[1].data_type()
        || inputs[0].data_type() != outputs[0].data_type()
    {
        return Support::unsupported(format!(
            "mixed element types {}, {} -> {}",
            inputs[0].data_type(),
            inputs[1].data_type(),
            outputs[0].data_type()
        ));
    }
    match broadcast_shape(inputs[0].shape(), inputs[1].shape()) {
        Ok(shape) if &shape == outputs[0].shape() => {}
        Ok(shape) => {
            return Support::malformed(format!(
                "inputs broadcast to {shape}, output is {}",
                outputs[0].shape()
            ))
        }
        Err(reason) => return Support::malformed(reason),
    }
    numeric_types(inputs).and_then(|| numeric_types(outputs))
}

fn create(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
    op: BinaryOp,
) -> BackendResult<Box<dyn Workload>> {
    match request.kind() {
        LayerKind::Addition | LayerKind::Multiplication => {
            KernelWorkload::boxed(request, Elementwise { op }, memory)
        }
        other => Err(BackendError::malformed(
            request.layer_name(),
            format!("{} is not an elementwise layer", other.operator()),
        )),
    }
}

pub(crate) fn create_addition(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    create(request, memory, BinaryOp::Add)
}

pub(crate) fn create_multiplication(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    create(request, memory, BinaryOp::Mul)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_rs::tensor::DataType;

    fn info(dims: &[usize]) -> TensorInfo {
        TensorInfo::from_dims(dims, DataType::Float32).unwrap()
    }

    #[test]
    fn broadcasts_unit_extents() {
        let workload_info =
            WorkloadInfo::new(vec![info(&[2, 1]), info(&[1, 3])], vec![info(&[2, 3])]);
        let out = Elementwise { op: BinaryOp::Add }
            .compute(&[vec![10.0, 20.0], vec![1.0, 2.0, 3.0]], &workload_info)
            .unwrap();
        assert_eq!(out[0], vec![11.0, 12.0, 13.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn mixed_types_are_unsupported() {
        let q = TensorInfo::quantized(*info(&[2]).shape(), DataType::QAsymmU8, 0.1, 0);
        let support = validate_elementwise(
            &LayerKind::Addition,
            &[info(&[2]), q],
            &[info(&[2])],
        );
        assert!(matches!(support, Support::Unsupported(_)));
    }
}
