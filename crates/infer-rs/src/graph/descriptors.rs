//! Operator parameter blocks carried by [`LayerKind`](super::LayerKind) payloads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::make_encoder;
use crate::error::InvalidArgument;
use crate::tensor::{DataLayout, TensorInfo};

/// Immutable constant tensor (weights, biases) owned by a layer payload.
///
/// The bytes are shared so cloning a layer does not duplicate weight storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstTensor {
    info: TensorInfo,
    data: Arc<[u8]>,
}

impl ConstTensor {
    /// Wraps raw element bytes; the length must match `info.num_bytes()`.
    pub fn new(info: TensorInfo, data: Vec<u8>) -> Result<Self, InvalidArgument> {
        if data.len() != info.num_bytes() {
            return Err(InvalidArgument::DataSize {
                expected: info.num_bytes(),
                found: data.len(),
            });
        }
        Ok(Self {
            info,
            data: Arc::from(data),
        })
    }

    /// Encodes real values into the element type described by `info`.
    pub fn from_f32(info: TensorInfo, values: &[f32]) -> Result<Self, InvalidArgument> {
        if values.len() != info.num_elements() {
            return Err(InvalidArgument::ElementCount {
                expected: info.num_elements(),
                found: values.len(),
            });
        }
        let mut data = vec![0u8; info.num_bytes()];
        make_encoder(&info)?.encode(values, &mut data);
        Self::new(info, data)
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FullyConnectedDescriptor {
    /// Weights are stored as `[outputs, inputs]` instead of `[inputs, outputs]`.
    pub transpose_weight_matrix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PoolingAlgorithm {
    #[default]
    Max,
    Average,
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputShapeRounding {
    #[default]
    Floor,
    Ceiling,
}

/// How padded positions count towards the averaging divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaddingMethod {
    /// Padding is part of the window area but contributes zero.
    #[default]
    IgnoreValue,
    /// Padding is left out of the window area.
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pooling2dDescriptor {
    pub pool_type: PoolingAlgorithm,
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
    pub pool_width: usize,
    pub pool_height: usize,
    pub stride_x: usize,
    pub stride_y: usize,
    pub output_shape_rounding: OutputShapeRounding,
    pub padding_method: PaddingMethod,
    pub data_layout: DataLayout,
}

impl Default for Pooling2dDescriptor {
    fn default() -> Self {
        Self {
            pool_type: PoolingAlgorithm::Max,
            pad_left: 0,
            pad_right: 0,
            pad_top: 0,
            pad_bottom: 0,
            pool_width: 1,
            pool_height: 1,
            stride_x: 1,
            stride_y: 1,
            output_shape_rounding: OutputShapeRounding::Floor,
            padding_method: PaddingMethod::IgnoreValue,
            data_layout: DataLayout::Nchw,
        }
    }
}

impl Pooling2dDescriptor {
    /// Output extent along one spatial axis, or `None` when the window does not fit.
    pub fn output_extent(
        &self,
        input: usize,
        pad_low: usize,
        pad_high: usize,
        pool: usize,
        stride: usize,
    ) -> Option<usize> {
        if stride == 0 || pool == 0 {
            return None;
        }
        let padded = input + pad_low + pad_high;
        let read = padded.checked_sub(pool)?;
        let mut extent = match self.output_shape_rounding {
            OutputShapeRounding::Floor => read / stride,
            OutputShapeRounding::Ceiling => read.div_ceil(stride),
        } + 1;
        // The last window must start inside the input or its leading padding.
        if self.output_shape_rounding == OutputShapeRounding::Ceiling
            && (extent - 1) * stride >= input + pad_low
        {
            extent -= 1;
        }
        Some(extent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct L2NormalizationDescriptor {
    /// Lower bound applied to the sum of squares before the square root.
    pub eps: f32,
    pub data_layout: DataLayout,
}

impl Default for L2NormalizationDescriptor {
    fn default() -> Self {
        Self {
            eps: 1e-12,
            data_layout: DataLayout::Nchw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SliceDescriptor {
    pub begin: Vec<usize>,
    pub size: Vec<usize>,
}

impl SliceDescriptor {
    pub fn new(begin: Vec<usize>, size: Vec<usize>) -> Self {
        Self { begin, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DataType, TensorShape};

    #[test]
    fn const_tensor_checks_byte_length() {
        let info = TensorInfo::new(TensorShape::new(&[2]).unwrap(), DataType::Float32);
        assert_eq!(
            ConstTensor::new(info.clone(), vec![0; 7]),
            Err(InvalidArgument::DataSize {
                expected: 8,
                found: 7
            })
        );
        let tensor = ConstTensor::from_f32(info, &[1.0, -2.0]).unwrap();
        assert_eq!(&tensor.data()[..4], &1.0f32.to_le_bytes());
    }

    #[test]
    fn pooling_extent_follows_rounding() {
        let mut desc = Pooling2dDescriptor::default();
        assert_eq!(desc.output_extent(5, 0, 0, 2, 2), Some(2));
        desc.output_shape_rounding = OutputShapeRounding::Ceiling;
        assert_eq!(desc.output_extent(5, 0, 0, 2, 2), Some(3));
        // Window starting entirely inside trailing padding is dropped.
        assert_eq!(desc.output_extent(4, 0, 1, 2, 2), Some(2));
        assert_eq!(desc.output_extent(1, 0, 0, 3, 1), None);
        assert_eq!(desc.output_extent(4, 0, 0, 2, 0), None);
    }
}
