use infer_rs::backend::{
    decode_f32, BackendError, BackendResult, Support, WorkingMemDescriptor, Workload,
    WorkloadInfo, WorkloadRequest,
};
use infer_rs::graph::{
    fully_connected_weight_extents, ConstTensor, FullyConnectedDescriptor, LayerKind,
};
use infer_rs::tensor::TensorInfo;

use super::{numeric_types, Kernel, KernelWorkload};

/// Dense layer with weights and bias decoded once at creation.
#[derive(Debug, Clone)]
pub struct FullyConnected {
    weights: Vec<f32>,
    bias: Option<Vec<f32>>,
    inputs: usize,
    outputs: usize,
    transposed: bool,
}

impl FullyConnected {
    pub fn new(
        descriptor: &FullyConnectedDescriptor,
        weights: &ConstTensor,
        bias: Option<&ConstTensor>,
    ) -> BackendResult<Self> {
        let (inputs, outputs) = fully_connected_weight_extents(
            descriptor,
            weights.info(),
            bias.map(ConstTensor::info),
        )
        .map_err(BackendError::execution)?;
        Ok(Self {
            weights: decode_f32(weights.info(), weights.data())?,
            bias: bias
                .map(|bias| decode_f32(bias.info(), bias.data()))
                .transpose()?,
            inputs,
            outputs,
            transposed: descriptor.transpose_weight_matrix,
        })
    }

    fn weight(&self, input: usize, output: usize) -> f32 {
        if self.transposed {
            self.weights[output * self.inputs + input]
        } else {
            self.weights[input * self.outputs + output]
        }
    }
}

impl Kernel for FullyConnected {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let input = &inputs[0];
        let batch = info.inputs[0].shape().dims()[0];
        if input.len() != batch * self.inputs {
            return Err(BackendError::execution(format!(
                "input of {} elements is not {batch} rows of {}",
                input.len(),
                self.inputs
            )));
        }
        let mut result = vec![0.0; batch * self.outputs];
        for b in 0..batch {
            let row = &input[b * self.inputs..(b + 1) * self.inputs];
            for o in 0..self.outputs {
                let mut acc = self.bias.as_ref().map_or(0.0, |bias| bias[o]);
                for (i, &value) in row.iter().enumerate() {
                    acc += value * self.weight(i, o);
                }
                result[b * self.outputs + o] = acc;
            }
        }
        Ok(vec![result])
    }
}

pub(crate) fn validate_fully_connected(
    kind: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    let LayerKind::FullyConnected {
        descriptor,
        weights,
        bias,
    } = kind
    else {
        return Support::malformed("expected a fully connected layer");
    };
    let bias_info = bias.as_ref().map(ConstTensor::info);
    let (weight_inputs, weight_outputs) =
        match fully_connected_weight_extents(descriptor, weights.info(), bias_info) {
            Ok(extents) => extents,
            Err(reason) => return Support::malformed(reason),
        };
    let dims = inputs[0].shape().dims();
    let input_size: usize = dims.iter().skip(1).product();
    if dims.len() < 2 || input_size != weight_inputs {
        return Support::malformed(format!(
            "input {} does not flatten to {weight_inputs} features",
            inputs[0].shape()
        ));
    }
    if outputs[0].shape().dims() != [dims[0], weight_outputs] {
        return Support::malformed(format!(
            "output must be [{}, {weight_outputs}], got {}",
            dims[0],
            outputs[0].shape()
        ));
    }
    let mut constants = vec![weights.info().clone()];
    constants.extend(bias.iter().map(|bias| bias.info().clone()));
    numeric_types(inputs)
        .and_then(|| numeric_types(outputs))
        .and_then(|| numeric_types(&constants))
}

pub(crate) fn create_fully_connected(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    let LayerKind::FullyConnected {
        descriptor,
        weights,
        bias,
    } = request.kind()
    else {
        return Err(BackendError::malformed(
            request.layer_name(),
            "expected a fully connected layer",
        ));
    };
    let kernel = FullyConnected::new(descriptor, weights, bias.as_ref())?;
    KernelWorkload::boxed(request, kernel, memory)
}
