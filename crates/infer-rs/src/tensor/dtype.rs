//! Enumerates the scalar element types a tensor slot may carry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical element type recorded on every [`TensorInfo`](super::TensorInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 16-bit IEEE-754 half precision.
    Float16,
    /// 16-bit bfloat16.
    BFloat16,
    /// 32-bit IEEE-754 single precision.
    Float32,
    /// 8-bit unsigned affine-quantized integer.
    QAsymmU8,
    /// 8-bit signed affine-quantized integer.
    QAsymmS8,
    /// 8-bit signed symmetric-quantized integer (supports per-axis scales).
    QSymmS8,
    /// 16-bit signed symmetric-quantized integer.
    QSymmS16,
    /// 32-bit signed integer, used for indices and biases of quantized layers.
    Signed32,
    /// 64-bit signed integer.
    Signed64,
    /// One byte per element, zero is false.
    Boolean,
}

impl DataType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::QAsymmU8 | DataType::QAsymmS8 | DataType::QSymmS8 | DataType::Boolean => 1,
            DataType::Float16 | DataType::BFloat16 | DataType::QSymmS16 => 2,
            DataType::Float32 | DataType::Signed32 => 4,
            DataType::Signed64 => 8,
        }
    }

    /// Returns `true` for the integer encodings that carry affine quantization parameters.
    pub fn is_quantized(self) -> bool {
        matches!(
            self,
            DataType::QAsymmU8 | DataType::QAsymmS8 | DataType::QSymmS8 | DataType::QSymmS16
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DataType::Float16 | DataType::BFloat16 | DataType::Float32
        )
    }

    /// Returns `true` for every integer encoding, quantized or not.
    pub fn is_integer(self) -> bool {
        self.is_quantized() || matches!(self, DataType::Signed32 | DataType::Signed64)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Float16 => "Float16",
            DataType::BFloat16 => "BFloat16",
            DataType::Float32 => "Float32",
            DataType::QAsymmU8 => "QAsymmU8",
            DataType::QAsymmS8 => "QAsymmS8",
            DataType::QSymmS8 => "QSymmS8",
            DataType::QSymmS16 => "QSymmS16",
            DataType::Signed32 => "Signed32",
            DataType::Signed64 => "Signed64",
            DataType::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
