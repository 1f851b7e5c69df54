use infer_rs::backend::{
    BackendError, BackendResult, Support, WorkingMemDescriptor, Workload, WorkloadInfo,
    WorkloadRequest,
};
use infer_rs::graph::{L2NormalizationDescriptor, LayerKind};
use infer_rs::tensor::TensorInfo;

use super::{numeric_types, Kernel, KernelWorkload};

/// Scales every element by the inverse L2 norm across the channel axis.
///
/// Tensors of rank below 4 are treated as 4D with leading unit extents, so the channel,
/// height and width indices of the layout still apply.
#[derive(Debug, Clone, Copy)]
pub struct L2Normalization {
    pub descriptor: L2NormalizationDescriptor,
}

impl L2Normalization {
    fn padded_shape(&self, dims: &[usize]) -> [usize; 4] {
        let layout = self.descriptor.data_layout;
        let shift = 4 - dims.len();
        let extent = |index: usize| index.checked_sub(shift).map_or(1, |i| dims[i]);
        let mut padded = [1; 4];
        padded[0] = if shift == 0 { dims[0] } else { 1 };
        padded[layout.channels_index()] = extent(layout.channels_index());
        padded[layout.height_index()] = extent(layout.height_index());
        padded[layout.width_index()] = extent(layout.width_index());
        padded
    }
}

impl Kernel for L2Normalization {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let layout = self.descriptor.data_layout;
        let shape = self.padded_shape(info.inputs[0].shape().dims());
        let (batches, channels) = (shape[0], shape[layout.channels_index()]);
        let (height, width) = (shape[layout.height_index()], shape[layout.width_index()]);
        let input = &inputs[0];
        let mut output = vec![0.0; input.len()];

        for n in 0..batches {
            for h in 0..height {
                for w in 0..width {
                    let sum: f32 = (0..channels)
                        .map(|d| input[layout.index(&shape, n, d, h, w)])
                        .map(|value| value * value)
                        .sum();
                    let scale = 1.0 / sum.max(self.descriptor.eps).sqrt();
                    for c in 0..channels {
                        let index = layout.index(&shape, n, c, h, w);
                        output[index] = input[index] * scale;
                    }
                }
            }
        }
        Ok(vec![output])
    }
}

pub(crate) fn validate_l2_normalization(
    kind: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    let LayerKind::L2Normalization(descriptor) = kind else {
        return Support::malformed("expected an L2 normalization layer");
    };
    if inputs[0].num_dimensions() > 4 {
        return Support::malformed(format!(
            "input must have at most 4 dimensions, got {}",
            inputs[0].shape()
        ));
    }
    if inputs[0].shape() != outputs[0].shape() {
        return Support::malformed("input and output shapes differ");
    }
    if descriptor.eps.is_nan() || descriptor.eps <= 0.0 {
        return Support::malformed(format!("eps must be positive, got {}", descriptor.eps));
    }
    numeric_types(inputs).and_then(|| numeric_types(outputs))
}

pub(crate) fn create_l2_normalization(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    let LayerKind::L2Normalization(descriptor) = request.kind() else {
        return Err(BackendError::malformed(
            request.layer_name(),
            "expected an L2 normalization layer",
        ));
    };
    let kernel = L2Normalization {
        descriptor: *descriptor,
    };
    KernelWorkload::boxed(request, kernel, memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_rs::tensor::{DataLayout, DataType};

    fn normalize(layout: DataLayout, dims: &[usize], input: &[f32]) -> Vec<f32> {
        let info = TensorInfo::from_dims(dims, DataType::Float32).unwrap();
        let workload_info = WorkloadInfo::new(vec![info.clone()], vec![info]);
        let kernel = L2Normalization {
            descriptor: L2NormalizationDescriptor {
                data_layout: layout,
                ..L2NormalizationDescriptor::default()
            },
        };
        kernel
            .compute(&[input.to_vec()], &workload_info)
            .unwrap()
            .remove(0)
    }

    fn assert_near(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn normalizes_across_channels_in_both_layouts() {
        // Two channels, two spatial positions: (3, 4) and (0, 5) per position.
        let nchw = normalize(DataLayout::Nchw, &[1, 2, 1, 2], &[3.0, 0.0, 4.0, 5.0]);
        assert_near(&nchw, &[0.6, 0.0, 0.8, 1.0]);
        let nhwc = normalize(DataLayout::Nhwc, &[1, 1, 2, 2], &[3.0, 4.0, 0.0, 5.0]);
        assert_near(&nhwc, &[0.6, 0.8, 0.0, 1.0]);
    }

    #[test]
    fn low_rank_inputs_pad_from_the_front() {
        // Rank 3 in NCHW reads as [1, C, H, W].
        let out = normalize(DataLayout::Nchw, &[2, 1, 1], &[6.0, 8.0]);
        assert_near(&out, &[0.6, 0.8]);
        // Rank 2 in NCHW has no channel axis, so every element is its own vector.
        let out = normalize(DataLayout::Nchw, &[2, 1], &[6.0, -8.0]);
        assert_near(&out, &[1.0, -1.0]);
        let out = normalize(DataLayout::Nchw, &[2, 1, 1], &[0.0, 0.0]);
        assert_near(&out, &[0.0, 0.0]);
    }
}
