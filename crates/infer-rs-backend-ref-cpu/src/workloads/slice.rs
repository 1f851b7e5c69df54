use infer_rs::backend::{
    BackendError, BackendResult, Support, WorkingMemDescriptor, Workload, WorkloadInfo,
    WorkloadRequest,
};
use infer_rs::graph::{LayerKind, SliceDescriptor};
use infer_rs::tensor::TensorInfo;

use super::{numeric_types, strides, Kernel, KernelWorkload};

/// Copies the window `[begin, begin + size)` out of the input.
#[derive(Debug, Clone)]
pub struct Slice {
    pub descriptor: SliceDescriptor,
}

impl Kernel for Slice {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let in_strides = strides(info.inputs[0].shape().dims());
        let size = &self.descriptor.size;
        let out_strides = strides(size);
        let count: usize = size.iter().product();
        let input = &inputs[0];
        let mut output = Vec::with_capacity(count);
        for flat in 0..count {
            let source: usize = (0..size.len())
                .map(|axis| {
                    let coord = (flat / out_strides[axis]) % size[axis];
                    (self.descriptor.begin[axis] + coord) * in_strides[axis]
                })
                .sum();
            output.push(input[source]);
        }
        Ok(vec![output])
    }
}

pub(crate) fn validate_slice(
    kind: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    let LayerKind::Slice(descriptor) = kind else {
        return Support::malformed("expected a slice layer");
    };
    let dims = inputs[0].shape().dims();
    if descriptor.begin.len() != dims.len() || descriptor.size.len() != dims.len() {
        return Support::malformed("begin and size need one entry per input dimension");
    }
    let in_range = descriptor
        .begin
        .iter()
        .zip(&descriptor.size)
        .zip(dims)
        .all(|((&begin, &size), &extent)| {
            size > 0 && begin.checked_add(size).map_or(false, |end| end <= extent)
        });
    if !in_range {
        return Support::malformed(format!(
            "slice {:?}+{:?} is out of range for {}",
            descriptor.begin,
            descriptor.size,
            inputs[0].shape()
        ));
    }
    if outputs[0].shape().dims() != descriptor.size.as_slice() {
        return Support::malformed("output shape must equal the slice size");
    }
    numeric_types(inputs).and_then(|| numeric_types(outputs))
}

pub(crate) fn create_slice(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    let LayerKind::Slice(descriptor) = request.kind() else {
        return Err(BackendError::malformed(
            request.layer_name(),
            "expected a slice layer",
        ));
    };
    let kernel = Slice {
        descriptor: descriptor.clone(),
    };
    KernelWorkload::boxed(request, kernel, memory)
}
