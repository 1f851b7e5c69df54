//! Per-kind shape inference used by [`Graph::validate_tensor_shapes_from_inputs`].
//!
//! [`Graph::validate_tensor_shapes_from_inputs`]: super::Graph::validate_tensor_shapes_from_inputs

use super::descriptors::{
    ConstTensor, FullyConnectedDescriptor, L2NormalizationDescriptor, Pooling2dDescriptor,
    SliceDescriptor,
};
use super::layer::{Layer, LayerKind, OutputSlot};
use crate::tensor::layout::tensor_shape_for_layout;
use crate::tensor::{DataType, TensorInfo, TensorShape};

/// Infers the output infos of `layer` from its resolved input infos.
pub(crate) fn infer_output_infos(
    layer: &Layer,
    inputs: &[TensorInfo],
) -> Result<Vec<TensorInfo>, String> {
    for (slot, info) in inputs.iter().enumerate() {
        if !info.shape().is_specified() {
            return Err(format!("input slot {slot} has no resolved shape"));
        }
    }
    match layer.kind() {
        LayerKind::Input { .. } => {
            let declared = &layer.outputs[0];
            if !declared.declared || !declared.info.shape().is_specified() {
                return Err("input layer requires a declared tensor info".to_string());
            }
            Ok(vec![declared.info.clone()])
        }
        LayerKind::Output { .. } => Ok(Vec::new()),
        LayerKind::Addition | LayerKind::Multiplication => {
            Ok(vec![elementwise_output(&inputs[0], &inputs[1])?])
        }
        LayerKind::FullyConnected {
            descriptor,
            weights,
            bias,
        } => Ok(vec![fully_connected_output(
            &inputs[0],
            descriptor,
            weights,
            bias.as_ref(),
        )?]),
        LayerKind::Pooling2d(descriptor) => Ok(vec![pooling2d_output(&inputs[0], descriptor)?]),
        LayerKind::L2Normalization(descriptor) => {
            Ok(vec![l2_normalization_output(&inputs[0], descriptor)?])
        }
        LayerKind::Slice(descriptor) => Ok(vec![slice_output(&inputs[0], descriptor)?]),
        LayerKind::GatherNd => Ok(vec![gather_nd_output(&inputs[0], &inputs[1])?]),
    }
}

/// Merges an inferred info into an output slot, honouring any caller-declared info.
pub(crate) fn resolve_output(slot: &mut OutputSlot, inferred: TensorInfo) -> Result<(), String> {
    if !slot.declared {
        slot.info = inferred;
        return Ok(());
    }
    if slot.info.shape().is_specified() {
        if slot.info.shape() != inferred.shape() {
            return Err(format!(
                "inferred output shape {} does not match declared shape {}",
                inferred.shape(),
                slot.info.shape()
            ));
        }
        return Ok(());
    }
    slot.info
        .set_shape(*inferred.shape())
        .map_err(|err| err.to_string())
}

/// Output info that keeps the element type and quantization of `input`.
///
/// Per-axis parameters are indexed by position along the quantization axis, so they carry over
/// only when `shape` equals the input shape. Any other output gets unit-scale parameters.
fn derived(input: &TensorInfo, shape: TensorShape) -> Result<TensorInfo, String> {
    if input.has_per_axis_quantization() && shape != *input.shape() {
        return Ok(TensorInfo::new(shape, input.data_type()));
    }
    let mut info = input.clone();
    info.set_shape(shape).map_err(|err| err.to_string())?;
    Ok(info)
}

fn shape_of(dims: &[usize]) -> Result<TensorShape, String> {
    TensorShape::new(dims).map_err(|err| err.to_string())
}

pub fn broadcast_shape(a: &TensorShape, b: &TensorShape) -> Result<TensorShape, String> {
    if a.rank() != b.rank() {
        return Err(format!(
            "inputs must have the same number of dimensions, got {a} and {b}"
        ));
    }
    let mut dims = Vec::with_capacity(a.rank());
    for (axis, (&lhs, &rhs)) in a.dims().iter().zip(b.dims()).enumerate() {
        let dim = match (lhs, rhs) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(format!(
                    "dimension {axis} is not broadcastable: {lhs} vs {rhs}"
                ))
            }
        };
        dims.push(dim);
    }
    shape_of(&dims)
}

fn elementwise_output(lhs: &TensorInfo, rhs: &TensorInfo) -> Result<TensorInfo, String> {
    if lhs.data_type() != rhs.data_type() {
        return Err(format!(
            "input data types differ: {} vs {}",
            lhs.data_type(),
            rhs.data_type()
        ));
    }
    derived(lhs, broadcast_shape(lhs.shape(), rhs.shape())?)
}

/// `(inputs, outputs)` extents of a fully connected weight matrix, checked against the bias.
///
/// Both extents must be non-zero and a bias must hold exactly one value per output.
pub fn fully_connected_weight_extents(
    descriptor: &FullyConnectedDescriptor,
    weights: &TensorInfo,
    bias: Option<&TensorInfo>,
) -> Result<(usize, usize), String> {
    let dims = weights.shape().dims();
    if dims.len() != 2 {
        return Err(format!("weights must be 2D, got {}", weights.shape()));
    }
    let (inputs, outputs) = if descriptor.transpose_weight_matrix {
        (dims[1], dims[0])
    } else {
        (dims[0], dims[1])
    };
    if inputs == 0 || outputs == 0 {
        return Err(format!(
            "weights {} must have non-zero extents",
            weights.shape()
        ));
    }
    if let Some(bias) = bias {
        if bias.shape().dims() != [outputs] {
            return Err(format!(
                "bias shape {} does not match output size {outputs}",
                bias.shape()
            ));
        }
    }
    Ok((inputs, outputs))
}

fn fully_connected_output(
    input: &TensorInfo,
    descriptor: &FullyConnectedDescriptor,
    weights: &ConstTensor,
    bias: Option<&ConstTensor>,
) -> Result<TensorInfo, String> {
    let dims = input.shape().dims();
    if dims.len() < 2 {
        return Err(format!(
            "input must have at least 2 dimensions, got {}",
            input.shape()
        ));
    }
    let batch = dims[0];
    let input_size: usize = dims[1..].iter().product();
    let (weight_inputs, weight_outputs) =
        fully_connected_weight_extents(descriptor, weights.info(), bias.map(ConstTensor::info))?;
    if input_size != weight_inputs {
        return Err(format!(
            "input size {input_size} does not match weight input size {weight_inputs}"
        ));
    }
    derived(input, shape_of(&[batch, weight_outputs])?)
}

fn pooling2d_output(
    input: &TensorInfo,
    descriptor: &Pooling2dDescriptor,
) -> Result<TensorInfo, String> {
    let dims = input.shape().dims();
    if dims.len() != 4 {
        return Err(format!("input must be 4D, got {}", input.shape()));
    }
    let layout = descriptor.data_layout;
    let batches = dims[0];
    let channels = dims[layout.channels_index()];
    let height = dims[layout.height_index()];
    let width = dims[layout.width_index()];
    let out_height = descriptor
        .output_extent(
            height,
            descriptor.pad_top,
            descriptor.pad_bottom,
            descriptor.pool_height,
            descriptor.stride_y,
        )
        .ok_or_else(|| {
            format!(
                "pool height {} with stride {} does not fit padded input height {height}",
                descriptor.pool_height, descriptor.stride_y
            )
        })?;
    let out_width = descriptor
        .output_extent(
            width,
            descriptor.pad_left,
            descriptor.pad_right,
            descriptor.pool_width,
            descriptor.stride_x,
        )
        .ok_or_else(|| {
            format!(
                "pool width {} with stride {} does not fit padded input width {width}",
                descriptor.pool_width, descriptor.stride_x
            )
        })?;
    derived(
        input,
        tensor_shape_for_layout(batches, channels, out_height, out_width, layout),
    )
}

fn l2_normalization_output(
    input: &TensorInfo,
    descriptor: &L2NormalizationDescriptor,
) -> Result<TensorInfo, String> {
    if input.num_dimensions() > 4 {
        return Err(format!(
            "input must have at most 4 dimensions, got {}",
            input.shape()
        ));
    }
    if descriptor.eps.is_nan() || descriptor.eps <= 0.0 {
        return Err(format!("eps must be positive, got {}", descriptor.eps));
    }
    derived(input, *input.shape())
}

fn slice_output(input: &TensorInfo, descriptor: &SliceDescriptor) -> Result<TensorInfo, String> {
    let dims = input.shape().dims();
    if descriptor.begin.len() != dims.len() || descriptor.size.len() != dims.len() {
        return Err(format!(
            "begin ({}) and size ({}) must both have one entry per input dimension ({})",
            descriptor.begin.len(),
            descriptor.size.len(),
            dims.len()
        ));
    }
    for (axis, ((&begin, &size), &extent)) in descriptor
        .begin
        .iter()
        .zip(&descriptor.size)
        .zip(dims)
        .enumerate()
    {
        if size == 0 || begin.checked_add(size).map_or(true, |end| end > extent) {
            return Err(format!(
                "slice [{begin}, {begin}+{size}) leaves dimension {axis} of extent {extent}"
            ));
        }
    }
    derived(input, shape_of(&descriptor.size)?)
}

fn gather_nd_output(params: &TensorInfo, indices: &TensorInfo) -> Result<TensorInfo, String> {
    if indices.data_type() != DataType::Signed32 {
        return Err(format!(
            "indices must be Signed32, got {}",
            indices.data_type()
        ));
    }
    let index_dims = indices.shape().dims();
    let param_dims = params.shape().dims();
    let depth = index_dims[index_dims.len() - 1];
    if depth == 0 || depth > param_dims.len() {
        return Err(format!(
            "index depth {depth} must be between 1 and the params rank {}",
            param_dims.len()
        ));
    }
    let mut dims: Vec<usize> = index_dims[..index_dims.len() - 1].to_vec();
    dims.extend_from_slice(&param_dims[depth..]);
    if dims.is_empty() {
        dims.push(1);
    }
    derived(params, shape_of(&dims)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::descriptors::{OutputShapeRounding, PoolingAlgorithm};
    use crate::tensor::DataLayout;

    fn info(dims: &[usize]) -> TensorInfo {
        TensorInfo::from_dims(dims, DataType::Float32).unwrap()
    }

    fn layer(kind: LayerKind) -> Layer {
        Layer::new(kind, "test")
    }

    #[test]
    fn elementwise_broadcasts_unit_dims() {
        let out = infer_output_infos(
            &layer(LayerKind::Addition),
            &[info(&[2, 1, 4]), info(&[1, 3, 4])],
        )
        .unwrap();
        assert_eq!(out[0].shape().dims(), &[2, 3, 4]);

        let err = infer_output_infos(
            &layer(LayerKind::Multiplication),
            &[info(&[2, 3]), info(&[2, 3, 1])],
        )
        .unwrap_err();
        assert!(err.contains("same number of dimensions"), "{err}");
        assert!(infer_output_infos(
            &layer(LayerKind::Multiplication),
            &[info(&[2, 3]), info(&[2, 4])]
        )
        .is_err());
    }

    #[test]
    fn fully_connected_flattens_trailing_dims() {
        let weights = ConstTensor::from_f32(info(&[6, 2]), &[0.0; 12]).unwrap();
        let bias = ConstTensor::from_f32(info(&[2]), &[0.0; 2]).unwrap();
        let kind = LayerKind::FullyConnected {
            descriptor: FullyConnectedDescriptor::default(),
            weights,
            bias: Some(bias),
        };
        let out = infer_output_infos(&layer(kind), &[info(&[3, 2, 3])]).unwrap();
        assert_eq!(out[0].shape().dims(), &[3, 2]);
    }

    #[test]
    fn pooling_applies_layout_and_rounding() {
        let descriptor = Pooling2dDescriptor {
            pool_type: PoolingAlgorithm::Average,
            pool_width: 2,
            pool_height: 2,
            stride_x: 2,
            stride_y: 2,
            output_shape_rounding: OutputShapeRounding::Ceiling,
            data_layout: DataLayout::Nhwc,
            ..Pooling2dDescriptor::default()
        };
        let out = infer_output_infos(
            &layer(LayerKind::Pooling2d(descriptor)),
            &[info(&[1, 5, 5, 3])],
        )
        .unwrap();
        assert_eq!(out[0].shape().dims(), &[1, 3, 3, 3]);
    }

    #[test]
    fn slice_checks_bounds() {
        let ok = SliceDescriptor::new(vec![0, 1], vec![2, 2]);
        let out = infer_output_infos(&layer(LayerKind::Slice(ok)), &[info(&[2, 3])]).unwrap();
        assert_eq!(out[0].shape().dims(), &[2, 2]);

        let bad = SliceDescriptor::new(vec![0, 2], vec![2, 2]);
        assert!(infer_output_infos(&layer(LayerKind::Slice(bad)), &[info(&[2, 3])]).is_err());

        let wrapping = SliceDescriptor::new(vec![usize::MAX], vec![2]);
        let err = infer_output_infos(&layer(LayerKind::Slice(wrapping)), &[info(&[4])])
            .unwrap_err();
        assert!(err.contains("leaves dimension 0"), "{err}");
    }

    #[test]
    fn fully_connected_rejects_bias_mismatch_and_empty_weights() {
        let weights = ConstTensor::from_f32(info(&[2, 2]), &[0.0; 4]).unwrap();
        let short_bias = ConstTensor::from_f32(info(&[1]), &[0.0]).unwrap();
        let kind = LayerKind::FullyConnected {
            descriptor: FullyConnectedDescriptor::default(),
            weights,
            bias: Some(short_bias),
        };
        let err = infer_output_infos(&layer(kind), &[info(&[1, 2])]).unwrap_err();
        assert!(err.contains("bias shape"), "{err}");

        let empty = ConstTensor::from_f32(info(&[0, 2]), &[]).unwrap();
        let kind = LayerKind::FullyConnected {
            descriptor: FullyConnectedDescriptor::default(),
            weights: empty,
            bias: None,
        };
        let err = infer_output_infos(&layer(kind), &[info(&[1, 0])]).unwrap_err();
        assert!(err.contains("non-zero"), "{err}");
    }

    #[test]
    fn per_axis_quantization_survives_shape_preserving_layers() {
        let shape = TensorShape::new(&[2, 3]).unwrap();
        let quantized = TensorInfo::per_axis(shape, DataType::QSymmS8, vec![0.5, 2.0], 0).unwrap();
        let out = infer_output_infos(
            &layer(LayerKind::Addition),
            &[quantized.clone(), quantized.clone()],
        )
        .unwrap();
        assert!(out[0].is_type_space_match(&quantized));

        let window = SliceDescriptor::new(vec![0, 0], vec![1, 3]);
        let out = infer_output_infos(&layer(LayerKind::Slice(window)), &[quantized]).unwrap();
        assert!(!out[0].has_per_axis_quantization());
        assert_eq!(out[0].data_type(), DataType::QSymmS8);
    }

    #[test]
    fn gather_nd_output_shape() {
        let indices = TensorInfo::from_dims(&[4, 2], DataType::Signed32).unwrap();
        let out =
            infer_output_infos(&layer(LayerKind::GatherNd), &[info(&[3, 5, 7]), indices]).unwrap();
        assert_eq!(out[0].shape().dims(), &[4, 7]);

        let float_indices = info(&[4, 2]);
        assert!(
            infer_output_infos(&layer(LayerKind::GatherNd), &[info(&[3, 5]), float_indices])
                .is_err()
        );
    }
}
