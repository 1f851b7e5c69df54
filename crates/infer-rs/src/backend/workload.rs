use super::codec::{make_decoder, make_encoder, Decoder, Encoder};
use super::error::{BackendError, BackendResult};
use super::handle::TensorHandle;
use crate::tensor::TensorInfo;

/// Resolved input and output infos of one layer, in slot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadInfo {
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
}

impl WorkloadInfo {
    pub fn new(inputs: Vec<TensorInfo>, outputs: Vec<TensorInfo>) -> Self {
        Self { inputs, outputs }
    }
}

/// Memory bound to one workload invocation, in slot order.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemDescriptor {
    pub inputs: Vec<TensorHandle>,
    pub outputs: Vec<TensorHandle>,
}

impl WorkingMemDescriptor {
    pub fn new(inputs: Vec<TensorHandle>, outputs: Vec<TensorHandle>) -> Self {
        Self { inputs, outputs }
    }

    /// Fresh zeroed allocations matching `info`.
    pub fn allocate(info: &WorkloadInfo) -> Self {
        Self {
            inputs: info.inputs.iter().cloned().map(TensorHandle::allocate).collect(),
            outputs: info.outputs.iter().cloned().map(TensorHandle::allocate).collect(),
        }
    }
}

/// Executable unit produced by a [`WorkloadFactory`](super::WorkloadFactory).
///
/// Lifecycle: created (memory bound), then [`configure`](Workload::configure) once, then any
/// number of [`execute`](Workload::execute) calls. [`execute_async`](Workload::execute_async)
/// runs against caller-supplied memory and does not depend on `configure`.
pub trait Workload: Send {
    /// Name of the layer this workload was created for.
    fn name(&self) -> &str;

    /// Resolves adapters for the memory bound at creation.
    fn configure(&mut self) -> BackendResult<()> {
        Ok(())
    }

    /// Reads the bound inputs and writes each bound output once.
    fn execute(&self) -> BackendResult<()>;

    /// Runs against `memory` instead of the bound handles.
    fn execute_async(&self, memory: &WorkingMemDescriptor) -> BackendResult<()>;
}

/// Checks that `memory` matches `info` slot for slot: same count, shape and element type.
pub fn check_memory(
    layer: &str,
    info: &WorkloadInfo,
    memory: &WorkingMemDescriptor,
) -> BackendResult<()> {
    check_handles(layer, "input", &info.inputs, &memory.inputs)?;
    check_handles(layer, "output", &info.outputs, &memory.outputs)
}

fn check_handles(
    layer: &str,
    direction: &str,
    infos: &[TensorInfo],
    handles: &[TensorHandle],
) -> BackendResult<()> {
    if infos.len() != handles.len() {
        return Err(BackendError::malformed(
            layer,
            format!(
                "expected {} {direction} handles, got {}",
                infos.len(),
                handles.len()
            ),
        ));
    }
    for (slot, (info, handle)) in infos.iter().zip(handles).enumerate() {
        let bound = handle.info();
        if bound.shape() != info.shape() || bound.data_type() != info.data_type() {
            return Err(BackendError::malformed(
                layer,
                format!(
                    "{direction} {slot} is bound to a {} {} tensor, expected {} {}",
                    bound.data_type(),
                    bound.shape(),
                    info.data_type(),
                    info.shape()
                ),
            ));
        }
        let len = handle.read().len();
        if len != info.num_bytes() {
            return Err(BackendError::malformed(
                layer,
                format!(
                    "{direction} {slot} holds {len} bytes, expected {}",
                    info.num_bytes()
                ),
            ));
        }
    }
    Ok(())
}

/// Shared state of a workload: layer name, operator parameters, resolved infos and the
/// memory bound at creation.
#[derive(Debug, Clone)]
pub struct BaseWorkload<D> {
    pub layer: String,
    pub descriptor: D,
    pub info: WorkloadInfo,
    pub memory: WorkingMemDescriptor,
}

impl<D> BaseWorkload<D> {
    /// Binds `memory` after checking it against `info`.
    pub fn new(
        layer: impl Into<String>,
        descriptor: D,
        info: WorkloadInfo,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Self> {
        let layer = layer.into();
        check_memory(&layer, &info, &memory)?;
        Ok(Self {
            layer,
            descriptor,
            info,
            memory,
        })
    }

    pub fn check(&self, memory: &WorkingMemDescriptor) -> BackendResult<()> {
        check_memory(&self.layer, &self.info, memory)
    }
}

/// Decoders for every input and encoders for every output of one binding.
pub struct Adapters {
    pub inputs: Vec<Box<dyn Decoder>>,
    pub outputs: Vec<Box<dyn Encoder>>,
}

impl Adapters {
    pub fn resolve(info: &WorkloadInfo) -> BackendResult<Self> {
        Ok(Self {
            inputs: info
                .inputs
                .iter()
                .map(make_decoder)
                .collect::<Result<_, _>>()?,
            outputs: info
                .outputs
                .iter()
                .map(make_encoder)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Adapters for the infos carried by the handles of `memory`.
    pub fn for_memory(memory: &WorkingMemDescriptor) -> BackendResult<Self> {
        Ok(Self {
            inputs: memory
                .inputs
                .iter()
                .map(|handle| make_decoder(handle.info()))
                .collect::<Result<_, _>>()?,
            outputs: memory
                .outputs
                .iter()
                .map(|handle| make_encoder(handle.info()))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Decodes every input of `memory` to `f32`.
    pub fn decode_inputs(&self, memory: &WorkingMemDescriptor) -> Vec<Vec<f32>> {
        memory
            .inputs
            .iter()
            .zip(&self.inputs)
            .map(|(handle, decoder)| decoder.decode(&handle.read()))
            .collect()
    }

    /// Encodes `values` into the outputs of `memory`, one vector per output slot.
    pub fn encode_outputs(
        &self,
        memory: &WorkingMemDescriptor,
        values: &[Vec<f32>],
    ) -> BackendResult<()> {
        if values.len() != memory.outputs.len() {
            return Err(BackendError::execution(format!(
                "kernel produced {} outputs, {} are bound",
                values.len(),
                memory.outputs.len()
            )));
        }
        for ((handle, encoder), values) in memory.outputs.iter().zip(&self.outputs).zip(values) {
            let expected = handle.info().num_elements();
            if values.len() != expected {
                return Err(BackendError::execution(format!(
                    "kernel produced {} elements for an output of {expected}",
                    values.len()
                )));
            }
            encoder.encode(values, &mut handle.write());
        }
        Ok(())
    }
}

pub(crate) fn not_configured(layer: &str) -> BackendError {
    BackendError::execution(format!("workload '{layer}' executed before configure"))
}

/// Adapters resolved by `configure`, or the error to report when it never ran.
pub fn configured<'a>(adapters: &'a Option<Adapters>, layer: &str) -> BackendResult<&'a Adapters> {
    adapters.as_ref().ok_or_else(|| not_configured(layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DataType, TensorShape};

    fn info(dims: &[usize]) -> TensorInfo {
        TensorInfo::new(TensorShape::new(dims).unwrap(), DataType::Float32)
    }

    #[test]
    fn base_workload_rejects_mismatched_memory() {
        let workload_info = WorkloadInfo::new(vec![info(&[2])], vec![info(&[2])]);
        let wrong = WorkingMemDescriptor::new(
            vec![TensorHandle::allocate(info(&[3]))],
            vec![TensorHandle::allocate(info(&[2]))],
        );
        let err = BaseWorkload::new("layer", (), workload_info.clone(), wrong).unwrap_err();
        assert!(matches!(err, BackendError::Malformed { .. }), "{err}");

        let missing = WorkingMemDescriptor::new(vec![], vec![]);
        assert!(BaseWorkload::new("layer", (), workload_info.clone(), missing).is_err());

        let ok = WorkingMemDescriptor::allocate(&workload_info);
        assert!(BaseWorkload::new("layer", (), workload_info, ok).is_ok());
    }

    #[test]
    fn adapters_round_trip_through_memory() {
        let workload_info = WorkloadInfo::new(vec![info(&[2])], vec![info(&[2])]);
        let memory = WorkingMemDescriptor::allocate(&workload_info);
        memory.inputs[0].write_f32(&[1.5, -1.0]).unwrap();
        let adapters = Adapters::resolve(&workload_info).unwrap();
        let decoded = adapters.decode_inputs(&memory);
        adapters.encode_outputs(&memory, &decoded).unwrap();
        assert_eq!(memory.outputs[0].read_f32().unwrap(), vec![1.5, -1.0]);
        assert!(adapters.encode_outputs(&memory, &[vec![0.0]]).is_err());
    }
}
