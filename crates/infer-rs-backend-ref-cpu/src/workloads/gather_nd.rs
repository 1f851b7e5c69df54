use infer_rs::backend::{
    BackendError, BackendResult, BaseWorkload, Support, WorkingMemDescriptor, Workload,
    WorkloadRequest,
};
use infer_rs::graph::LayerKind;
use infer_rs::tensor::{DataType, TensorInfo};

use super::{numeric_types, strides};

/// Gathers slices of `params` addressed by the innermost axis of `indices`.
///
/// Runs on whatever memory it is handed; [`execute`](Workload::execute) forwards the memory
/// bound at creation, so there is nothing to configure.
pub struct GatherNdWorkload {
    base: BaseWorkload<()>,
}

impl GatherNdWorkload {
    pub fn new(request: &WorkloadRequest, memory: WorkingMemDescriptor) -> BackendResult<Self> {
        Ok(Self {
            base: BaseWorkload::new(request.layer_name(), (), request.info().clone(), memory)?,
        })
    }

    fn gather(&self, memory: &WorkingMemDescriptor) -> BackendResult<()> {
        let params_info = memory.inputs[0].info();
        let indices_info = memory.inputs[1].info();
        let params = memory.inputs[0].read_f32()?;
        let indices = memory.inputs[1].read_f32()?;

        let param_dims = params_info.shape().dims();
        let index_dims = indices_info.shape().dims();
        let depth = index_dims[index_dims.len() - 1];
        let param_strides = strides(param_dims);
        let chunk: usize = param_dims[depth..].iter().product();
        let lookups = indices_info.num_elements() / depth;

        let mut output = Vec::with_capacity(lookups * chunk);
        for lookup in indices.chunks(depth) {
            let mut offset = 0;
            for (axis, &raw) in lookup.iter().enumerate() {
                let index = raw as i64;
                if index < 0 || index as usize >= param_dims[axis] {
                    return Err(BackendError::execution(format!(
                        "gather index {index} is out of range for axis {axis} of extent {}",
                        param_dims[axis]
                    )));
                }
                offset += index as usize * param_strides[axis];
            }
            output.extend_from_slice(&params[offset..offset + chunk]);
        }
        memory.outputs[0].write_f32(&output)?;
        Ok(())
    }
}

impl Workload for GatherNdWorkload {
    fn name(&self) -> &str {
        &self.base.layer
    }

    fn execute(&self) -> BackendResult<()> {
        self.execute_async(&self.base.memory)
    }

    fn execute_async(&self, memory: &WorkingMemDescriptor) -> BackendResult<()> {
        self.base.check(memory)?;
        self.gather(memory)
    }
}

pub(crate) fn validate_gather_nd(
    _: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    if inputs[1].data_type() != DataType::Signed32 {
        return Support::unsupported(format!(
            "indices must be Signed32, got {}",
            inputs[1].data_type()
        ));
    }
    let index_dims = inputs[1].shape().dims();
    let depth = index_dims[index_dims.len() - 1];
    if depth == 0 || depth > inputs[0].num_dimensions() {
        return Support::malformed(format!(
            "index depth {depth} must be between 1 and the params rank {}",
            inputs[0].num_dimensions()
        ));
    }
    if inputs[0].data_type() != outputs[0].data_type() {
        return Support::unsupported("params and output element types differ");
    }
    numeric_types(&inputs[..1]).and_then(|| numeric_types(outputs))
}

pub(crate) fn create_gather_nd(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    Ok(Box::new(GatherNdWorkload::new(request, memory)?))
}
