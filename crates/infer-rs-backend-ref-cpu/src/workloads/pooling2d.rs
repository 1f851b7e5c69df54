use infer_rs::backend::{
    BackendError, BackendResult, Support, WorkingMemDescriptor, Workload, WorkloadInfo,
    WorkloadRequest,
};
use infer_rs::graph::{LayerKind, PaddingMethod, Pooling2dDescriptor, PoolingAlgorithm};
use infer_rs::tensor::TensorInfo;

use super::{numeric_types, Kernel, KernelWorkload};

/// 2D max, average or L2 pooling over the spatial axes of a 4D tensor.
#[derive(Debug, Clone, Copy)]
pub struct Pooling2d {
    pub descriptor: Pooling2dDescriptor,
}

fn dims4(info: &TensorInfo) -> [usize; 4] {
    let dims = info.shape().dims();
    [dims[0], dims[1], dims[2], dims[3]]
}

impl Kernel for Pooling2d {
    fn compute(&self, inputs: &[Vec<f32>], info: &WorkloadInfo) -> BackendResult<Vec<Vec<f32>>> {
        let d = &self.descriptor;
        let layout = d.data_layout;
        let in_shape = dims4(&info.inputs[0]);
        let out_shape = dims4(&info.outputs[0]);
        let (batches, channels) = (in_shape[0], in_shape[layout.channels_index()]);
        let (in_h, in_w) = (
            in_shape[layout.height_index()] as isize,
            in_shape[layout.width_index()] as isize,
        );
        let (out_h, out_w) = (
            out_shape[layout.height_index()],
            out_shape[layout.width_index()],
        );
        let input = &inputs[0];
        let mut output = vec![0.0; info.outputs[0].num_elements()];

        for n in 0..batches {
            for c in 0..channels {
                for y in 0..out_h {
                    for x in 0..out_w {
                        let mut h_start = (y * d.stride_y) as isize - d.pad_top as isize;
                        let mut w_start = (x * d.stride_x) as isize - d.pad_left as isize;
                        let mut h_end =
                            (h_start + d.pool_height as isize).min(in_h + d.pad_bottom as isize);
                        let mut w_end =
                            (w_start + d.pool_width as isize).min(in_w + d.pad_right as isize);
                        let mut area = (h_end - h_start) * (w_end - w_start);

                        h_start = h_start.max(0);
                        w_start = w_start.max(0);
                        h_end = h_end.min(in_h);
                        w_end = w_end.min(in_w);

                        let index = layout.index(&out_shape, n, c, y, x);
                        if h_start >= h_end || w_start >= w_end {
                            output[index] = 0.0;
                            continue;
                        }
                        if d.padding_method == PaddingMethod::Exclude {
                            area = (h_end - h_start) * (w_end - w_start);
                        }

                        let mut acc = match d.pool_type {
                            PoolingAlgorithm::Max => f32::NEG_INFINITY,
                            PoolingAlgorithm::Average | PoolingAlgorithm::L2 => 0.0,
                        };
                        for h in h_start..h_end {
                            for w in w_start..w_end {
                                let value =
                                    input[layout.index(&in_shape, n, c, h as usize, w as usize)];
                                match d.pool_type {
                                    PoolingAlgorithm::Max => acc = acc.max(value),
                                    PoolingAlgorithm::Average => acc += value,
                                    PoolingAlgorithm::L2 => acc += value * value,
                                }
                            }
                        }
                        output[index] = match d.pool_type {
                            PoolingAlgorithm::Max => acc,
                            PoolingAlgorithm::Average => acc / area as f32,
                            PoolingAlgorithm::L2 => (acc / area as f32).sqrt(),
                        };
                    }
                }
            }
        }
        Ok(vec![output])
    }
}

pub(crate) fn validate_pooling2d(
    kind: &LayerKind,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
) -> Support {
    let LayerKind::Pooling2d(descriptor) = kind else {
        return Support::malformed("expected a pooling layer");
    };
    if inputs[0].num_dimensions() != 4 || outputs[0].num_dimensions() != 4 {
        return Support::malformed("pooling tensors must be 4D");
    }
    if descriptor.stride_x == 0
        || descriptor.stride_y == 0
        || descriptor.pool_width == 0
        || descriptor.pool_height == 0
    {
        return Support::malformed("pool extents and strides must be positive");
    }
    if inputs[0].data_type() != outputs[0].data_type() {
        return Support::unsupported("input and output element types differ");
    }
    numeric_types(inputs).and_then(|| numeric_types(outputs))
}

pub(crate) fn create_pooling2d(
    request: &WorkloadRequest,
    memory: WorkingMemDescriptor,
) -> BackendResult<Box<dyn Workload>> {
    let LayerKind::Pooling2d(descriptor) = request.kind() else {
        return Err(BackendError::malformed(
            request.layer_name(),
            "expected a pooling layer",
        ));
    };
    let kernel = Pooling2d {
        descriptor: *descriptor,
    };
    KernelWorkload::boxed(request, kernel, memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_rs::graph::OutputShapeRounding;
    use infer_rs::tensor::DataType;

    fn info(dims: &[usize]) -> TensorInfo {
        TensorInfo::from_dims(dims, DataType::Float32).unwrap()
    }

    fn pool(
        descriptor: Pooling2dDescriptor,
        input: &[f32],
        in_dims: &[usize],
        out_dims: &[usize],
    ) -> Vec<f32> {
        let workload_info = WorkloadInfo::new(vec![info(in_dims)], vec![info(out_dims)]);
        Pooling2d { descriptor }
            .compute(&[input.to_vec()], &workload_info)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn max_and_average_over_2x2_windows() {
        let input: Vec<f32> = (1..=16).map(|v| v as f32).collect();
        let base = Pooling2dDescriptor {
            pool_width: 2,
            pool_height: 2,
            stride_x: 2,
            stride_y: 2,
            ..Pooling2dDescriptor::default()
        };
        assert_eq!(
            pool(base, &input, &[1, 1, 4, 4], &[1, 1, 2, 2]),
            vec![6.0, 8.0, 14.0, 16.0]
        );
        let average = Pooling2dDescriptor {
            pool_type: PoolingAlgorithm::Average,
            ..base
        };
        assert_eq!(
            pool(average, &input, &[1, 1, 4, 4], &[1, 1, 2, 2]),
            vec![3.5, 5.5, 11.5, 13.5]
        );
    }

    #[test]
    fn padding_method_controls_the_divisor() {
        let input = vec![4.0; 4];
        let padded = Pooling2dDescriptor {
            pool_type: PoolingAlgorithm::Average,
            pool_width: 2,
            pool_height: 2,
            stride_x: 2,
            stride_y: 2,
            pad_left: 1,
            pad_top: 1,
            output_shape_rounding: OutputShapeRounding::Floor,
            ..Pooling2dDescriptor::default()
        };
        // Window (0, 0) covers one real value and three padded positions.
        let ignore = pool(padded, &input, &[1, 1, 2, 2], &[1, 1, 1, 1]);
        assert_eq!(ignore, vec![1.0]);
        let exclude = Pooling2dDescriptor {
            padding_method: PaddingMethod::Exclude,
            ..padded
        };
        assert_eq!(pool(exclude, &input, &[1, 1, 2, 2], &[1, 1, 1, 1]), vec![4.0]);
    }
}
