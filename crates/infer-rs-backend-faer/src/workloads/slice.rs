use infer_rs::backend::{
    make_decoder, BackendError, BackendResult, Support, WorkingMemDescriptor, Workload,
    WorkloadInfo, WorkloadRequest,
};
use infer_rs::graph::{LayerKind, SliceDescriptor};
use infer_rs::tensor::TensorInfo;
use infer_rs_backend_ref_cpu::{Kernel, KernelWorkload};

use crate::native::{self, NativeTensor, Primitive};

/// Slice dispatched to the native `slice` primitive.
#[derive(Debug, Clone)]
pub struct NativeSlice {
    primitive: Primitive,
}

impl NativeSlice {
    pub fn new(descriptor: &SliceDescriptor) -> Self {
        let (starts, ends) = native::slice_coordinates(&descriptor.begin, &descriptor.size);
        Self {
            primitive: Primitive::Slice { starts, ends },
        }
    }
}

impl Kernel for NativeSlice {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let input = NativeTensor::from_values(&info.inputs[0], inputs[0].clone())?;
        let mut output = NativeTensor::allocate(&info.outputs[0]);
        let status = native::run(&self.primitive, &input, &mut output);
        if !status.ok {
            return Err(BackendError::execution(status.description));
        }
        Ok(vec![output.into_values()])
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
    let rank = inputs[0].num_dimensions();
    if descriptor.begin.len() != rank || descriptor.size.len() != rank {
        return Support::malformed("begin and size need one entry per input dimension");
    }
    let fits = descriptor
        .begin
        .iter()
        .zip(&descriptor.size)
        .zip(inputs[0].shape().dims())
        .all(|((&begin, &size), &extent)| {
            begin.checked_add(size).map_or(false, |end| end <= extent)
        });
    if !fits {
        return Support::malformed(format!(
            "slice {:?}+{:?} is out of range for {}",
            descriptor.begin,
            descriptor.size,
            inputs[0].shape()
        ));
    }
    let slice = NativeSlice::new(descriptor);
    match slice
        .primitive
        .output_shape(&NativeTensor::describe(&inputs[0]))
    {
        Ok(shape) if shape == NativeTensor::describe(&outputs[0]) => {}
        Ok(_) => return Support::malformed("output shape must equal the slice size"),
        Err(status) => return Support::malformed(status.description),
    }
    for info in inputs.iter().chain(outputs) {
        if let Err(err) = make_decoder(info) {
            return Support::unsupported(err.to_string());
        }
    }
    Support::Supported
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
    KernelWorkload::boxed(request, NativeSlice::new(descriptor), memory)
}
