//! Reference kernels. Every kernel decodes its inputs to `f32`, computes in `f32` and encodes
//! the results into the output element types.

mod elementwise;
mod fully_connected;
mod gather_nd;
mod l2_normalization;
mod pooling2d;
mod slice;

pub use elementwise::{BinaryOp, Elementwise};
pub use fully_connected::FullyConnected;
pub use gather_nd::GatherNdWorkload;
pub use l2_normalization::L2Normalization;
pub use pooling2d::Pooling2d;
pub use slice::Slice;

pub(crate) use elementwise::{create_addition, create_multiplication, validate_elementwise};
pub(crate) use fully_connected::{create_fully_connected, validate_fully_connected};
pub(crate) use gather_nd::{create_gather_nd, validate_gather_nd};
pub(crate) use l2_normalization::{create_l2_normalization, validate_l2_normalization};
pub(crate) use pooling2d::{create_pooling2d, validate_pooling2d};
pub(crate) use slice::{create_slice, validate_slice};

use infer_rs::backend::{
    configured, make_decoder, Adapters, BackendResult, BaseWorkload, Support,
    WorkingMemDescriptor, Workload, WorkloadInfo, WorkloadRequest,
};
use infer_rs::tensor::{DataType, TensorInfo};

/// Computation of one operator on decoded `f32` data.
pub trait Kernel: Send + 'static {
    /// Returns one vector per output slot, sized to that output's element count.
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>>;
}

/// Workload driving a [`Kernel`] through the decode/compute/encode cycle.
pub struct KernelWorkload<K> {
    base: BaseWorkload<K>,
    adapters: Option<Adapters>,
}

impl<K: Kernel> KernelWorkload<K> {
    pub fn new(
        request: &WorkloadRequest,
        kernel: K,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Self> {
        Ok(Self {
            base: BaseWorkload::new(request.layer_name(), kernel, request.info().clone(), memory)?,
            adapters: None,
        })
    }

    pub fn boxed(
        request: &WorkloadRequest,
        kernel: K,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>> {
        Ok(Box::new(Self::new(request, kernel, memory)?))
    }

    pub fn kernel(&self) -> &K {
        &self.base.descriptor
    }

    fn run(&self, memory: &WorkingMemDescriptor, adapters: &Adapters) -> BackendResult<()> {
        let inputs = adapters.decode_inputs(memory);
        let outputs = self.base.descriptor.compute(&inputs, &self.base.info)?;
        adapters.encode_outputs(memory, &outputs)
    }
}

impl<K: Kernel> Workload for KernelWorkload<K> {
    fn name(&self) -> &str {
        &self.base.layer
    }

    fn configure(&mut self) -> BackendResult<()> {
        self.adapters = Some(Adapters::resolve(&self.base.info)?);
        Ok(())
    }

    fn execute(&self) -> BackendResult<()> {
        let adapters = configured(&self.adapters, &self.base.layer)?;
        self.run(&self.base.memory, adapters)
    }

    fn execute_async(&self, memory: &WorkingMemDescriptor) -> BackendResult<()> {
        self.base.check(memory)?;
        self.run(memory, &Adapters::for_memory(memory)?)
    }
}

/// Every info has a decodable element type other than `Boolean`.
pub(crate) fn numeric_types(infos: &[TensorInfo]) -> Support {
    for info in infos {
        if info.data_type() == DataType::Boolean {
            return Support::unsupported("boolean tensors are not supported");
        }
        if let Err(err) = make_decoder(info) {
            return Support::unsupported(err.to_string());
        }
    }
    Support::Supported
}

/// Row-major strides of `dims`.
pub(crate) fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(strides(&[5]), vec![1]);
    }
}
