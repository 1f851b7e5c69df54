use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::Accum;
use infer_rs::backend::{
    decode_f32, BackendError, BackendResult, Support, WorkingMemDescriptor, Workload,
    WorkloadInfo, WorkloadRequest,
};
use infer_rs::graph::{
    fully_connected_weight_extents, ConstTensor, FullyConnectedDescriptor, LayerKind,
};
use infer_rs::tensor::TensorInfo;
use infer_rs_backend_ref_cpu::{Kernel, KernelWorkload};

use super::dense_types;
use crate::faer_parallelism;

/// Dense layer computed as a single faer matmul per batch, plus the bias row.
#[derive(Debug, Clone)]
pub struct FaerFullyConnected {
    weights: Vec<f32>,
    bias: Option<Vec<f32>>,
    inputs: usize,
    outputs: usize,
    transposed: bool,
}

impl FaerFullyConnected {
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

    /// Weights as a `(inputs x outputs)` view, whichever layout they are stored in.
    fn weight_view(&self) -> MatRef<'_, f32> {
        let weights = self.weights.as_slice();
        if self.transposed {
            MatRef::from_row_major_slice(weights, self.outputs, self.inputs).transpose()
        } else {
            MatRef::from_row_major_slice(weights, self.inputs, self.outputs)
        }
    }
}

impl Kernel for FaerFullyConnected {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let input = &inputs[0];
        let (k, n) = (self.inputs, self.outputs);
        let m = info.inputs[0].shape().dims()[0];
        if input.len() != m * k {
            return Err(BackendError::execution(format!(
                "input of {} elements is not {m} rows of {k}",
                input.len()
            )));
        }
        let mut row_major = vec![0.0f32; m * n];
        if m == 0 || n == 0 {
            return Ok(vec![row_major]);
        }

        let lhs_view = MatRef::from_row_major_slice(input.as_slice(), m, k);
        // Column-major (n x m) output shares its buffer layout with row-major (m x n).
        let a_t = lhs_view.transpose();
        let b_t = self.weight_view().transpose();
        let mut out_view = MatMut::from_column_major_slice_mut(row_major.as_mut_slice(), n, m);
        matmul(&mut out_view, Accum::Replace, b_t, a_t, 1.0f32, faer_parallelism());

        if let Some(bias) = &self.bias {
            for row in row_major.chunks_exact_mut(n) {
                for (value, &b) in row.iter_mut().zip(bias) {
                    *value += b;
                }
            }
        }
        Ok(vec![row_major])
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
    if dims.len() < 2 || dims[1..].iter().product::<usize>() != weight_inputs {
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
    dense_types(inputs)
        .and_then(|| dense_types(outputs))
        .and_then(|| dense_types(&constants))
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
    let kernel = FaerFullyConnected::new(descriptor, weights, bias.as_ref())?;
    KernelWorkload::boxed(request, kernel, memory)
}
