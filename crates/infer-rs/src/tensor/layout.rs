//! Data-layout aware shape helpers.

use serde::{Deserialize, Serialize};

use super::{DataType, TensorInfo, TensorShape};
use crate::error::InvalidArgument;

/// Memory order of a rank-4 activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataLayout {
    #[default]
    Nchw,
    Nhwc,
}

impl DataLayout {
    pub fn channels_index(self) -> usize {
        match self {
            DataLayout::Nchw => 1,
            DataLayout::Nhwc => 3,
        }
    }

    pub fn height_index(self) -> usize {
        match self {
            DataLayout::Nchw => 2,
            DataLayout::Nhwc => 1,
        }
    }

    pub fn width_index(self) -> usize {
        match self {
            DataLayout::Nchw => 3,
            DataLayout::Nhwc => 2,
        }
    }

    /// Flat row-major offset of element `(n, c, h, w)` inside a rank-4 `shape` in this layout.
    pub fn index(self, shape: &[usize; 4], n: usize, c: usize, h: usize, w: usize) -> usize {
        match self {
            DataLayout::Nchw => ((n * shape[1] + c) * shape[2] + h) * shape[3] + w,
            DataLayout::Nhwc => ((n * shape[1] + h) * shape[2] + w) * shape[3] + c,
        }
    }
}

/// Builds a rank-4 shape with the batch/channel/spatial extents placed for `layout`.
pub fn tensor_shape_for_layout(
    batches: usize,
    channels: usize,
    height: usize,
    width: usize,
    layout: DataLayout,
) -> TensorShape {
    let dims = match layout {
        DataLayout::Nchw => [batches, channels, height, width],
        DataLayout::Nhwc => [batches, height, width, channels],
    };
    // Rank 4 is always within bounds.
    TensorShape::new(&dims).unwrap_or_default()
}

pub fn tensor_info_for_layout(
    batches: usize,
    channels: usize,
    height: usize,
    width: usize,
    layout: DataLayout,
    data_type: DataType,
) -> TensorInfo {
    TensorInfo::new(
        tensor_shape_for_layout(batches, channels, height, width, layout),
        data_type,
    )
}

/// Inserts a unit dimension at `axis`; negative axes count from the end of the result.
pub fn expand_dims(shape: &TensorShape, axis: i32) -> Result<TensorShape, InvalidArgument> {
    let rank = shape.rank();
    let output_rank = rank + 1;
    let axis_i64 = i64::from(axis);
    if axis_i64 < -(output_rank as i64) || axis_i64 > rank as i64 {
        return Err(InvalidArgument::Axis {
            axis: axis_i64,
            rank,
        });
    }
    let axis = if axis < 0 {
        (output_rank as i64 + axis_i64) as usize
    } else {
        axis as usize
    };
    let mut dims = shape.dims().to_vec();
    dims.insert(axis, 1);
    TensorShape::new(&dims)
}

/// Product of extents over `[first_inclusive, last_exclusive)`.
pub fn num_elements_between(
    shape: &TensorShape,
    first_inclusive: usize,
    last_exclusive: usize,
) -> Result<usize, InvalidArgument> {
    if first_inclusive > last_exclusive || last_exclusive > shape.rank() {
        return Err(InvalidArgument::AxisRange {
            first: first_inclusive,
            last: last_exclusive,
            rank: shape.rank(),
        });
    }
    Ok(shape.dims()[first_inclusive..last_exclusive].iter().product())
}

/// Resolves a possibly negative axis against `rank`.
pub fn unsigned_axis(rank: usize, axis: i32) -> Result<usize, InvalidArgument> {
    let signed = i64::from(axis);
    if signed >= rank as i64 || signed < -(rank as i64) {
        return Err(InvalidArgument::Axis { axis: signed, rank });
    }
    Ok(if signed < 0 {
        (rank as i64 + signed) as usize
    } else {
        signed as usize
    })
}

/// Product of extents from `axis` (inclusive) to the innermost dimension.
pub fn num_elements_after(shape: &TensorShape, axis: usize) -> Result<usize, InvalidArgument> {
    if axis >= shape.rank() {
        return Err(InvalidArgument::Axis {
            axis: axis as i64,
            rank: shape.rank(),
        });
    }
    num_elements_between(shape, axis, shape.rank())
}

/// Returns `(axis_factor, scales)` for a per-axis quantized descriptor, where `axis_factor` is
/// the number of elements spanned by one step of the outer-most index above the quantization
/// axis. Element `i` uses scale `(i % axis_factor) / (axis_factor / scales.len())`.
pub fn per_axis_params(info: &TensorInfo) -> Result<(usize, Vec<f32>), InvalidArgument> {
    let axis = match info.quantization_axis() {
        Some(axis) if info.has_per_axis_quantization() => axis,
        _ => return Err(InvalidArgument::PerAxisParamsMissing(info.data_type())),
    };
    let axis_factor = num_elements_after(info.shape(), axis)?;
    Ok((axis_factor, info.quantization_scales().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> TensorShape {
        TensorShape::new(dims).unwrap()
    }

    #[test]
    fn layout_places_channels() {
        assert_eq!(
            tensor_shape_for_layout(1, 3, 8, 6, DataLayout::Nchw).dims(),
            &[1, 3, 8, 6]
        );
        assert_eq!(
            tensor_shape_for_layout(1, 3, 8, 6, DataLayout::Nhwc).dims(),
            &[1, 8, 6, 3]
        );
        let info = tensor_info_for_layout(2, 3, 4, 5, DataLayout::Nhwc, DataType::QAsymmU8);
        assert_eq!(info.num_bytes(), 2 * 3 * 4 * 5);
    }

    #[test]
    fn layout_index_matches_row_major() {
        let nchw = [2, 3, 4, 5];
        assert_eq!(DataLayout::Nchw.index(&nchw, 1, 2, 3, 4), 119);
        let nhwc = [2, 4, 5, 3];
        assert_eq!(DataLayout::Nhwc.index(&nhwc, 1, 2, 3, 4), 119);
        assert_eq!(DataLayout::Nhwc.index(&nhwc, 0, 1, 0, 0), 1);
    }

    #[test]
    fn expand_dims_accepts_negative_axes() {
        let base = shape(&[2, 3]);
        assert_eq!(expand_dims(&base, 0).unwrap().dims(), &[1, 2, 3]);
        assert_eq!(expand_dims(&base, 2).unwrap().dims(), &[2, 3, 1]);
        assert_eq!(expand_dims(&base, -1).unwrap().dims(), &[2, 3, 1]);
        assert_eq!(expand_dims(&base, -3).unwrap().dims(), &[1, 2, 3]);
        assert_eq!(
            expand_dims(&base, 3),
            Err(InvalidArgument::Axis { axis: 3, rank: 2 })
        );
        assert!(expand_dims(&base, -4).is_err());
    }

    #[test]
    fn element_ranges() {
        let base = shape(&[2, 3, 4]);
        assert_eq!(num_elements_between(&base, 1, 3).unwrap(), 12);
        assert_eq!(num_elements_between(&base, 1, 1).unwrap(), 1);
        assert!(num_elements_between(&base, 2, 1).is_err());
        assert_eq!(num_elements_after(&base, 0).unwrap(), 24);
        assert_eq!(num_elements_after(&base, 2).unwrap(), 4);
        assert!(num_elements_after(&base, 3).is_err());
    }

    #[test]
    fn unsigned_axis_wraps_negatives() {
        assert_eq!(unsigned_axis(4, -1).unwrap(), 3);
        assert_eq!(unsigned_axis(4, 2).unwrap(), 2);
        assert!(unsigned_axis(4, 4).is_err());
        assert!(unsigned_axis(4, -5).is_err());
    }

    #[test]
    fn per_axis_params_require_per_axis_info() {
        let info = TensorInfo::per_axis(shape(&[3, 2]), DataType::QSymmS8, vec![0.5, 1.0, 2.0], 0)
            .unwrap();
        assert_eq!(per_axis_params(&info).unwrap(), (6, vec![0.5, 1.0, 2.0]));

        let plain = TensorInfo::quantized(shape(&[3, 2]), DataType::QSymmS8, 0.5, 0);
        assert_eq!(
            per_axis_params(&plain),
            Err(InvalidArgument::PerAxisParamsMissing(DataType::QSymmS8))
        );
    }
}
