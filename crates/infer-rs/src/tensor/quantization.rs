//! Affine quantization parameters carried inside a tensor descriptor.

use serde::{Deserialize, Serialize};

/// Scale/offset/axis triple describing how integer elements map to real values:
/// `real = scale * (quantized - offset)`.
///
/// Every field is optional at this level. Readers that need the legacy single-scale view go
/// through [`TensorInfo`](super::TensorInfo), which applies the `scale = 1.0`, `offset = 0`
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    #[serde(default)]
    pub(crate) scales: Vec<f32>,
    #[serde(default)]
    pub(crate) offset: Option<i32>,
    #[serde(default)]
    pub(crate) axis: Option<usize>,
}

impl QuantizationParams {
    pub fn per_tensor(scale: f32, offset: i32) -> Self {
        Self {
            scales: vec![scale],
            offset: Some(offset),
            axis: None,
        }
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn offset(&self) -> Option<i32> {
        self.offset
    }

    pub fn axis(&self) -> Option<usize> {
        self.axis
    }

    pub fn has_multiple_scales(&self) -> bool {
        self.scales.len() > 1
    }
}
