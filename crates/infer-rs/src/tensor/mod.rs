//! Tensor descriptor model: shapes, element types, quantization and layout helpers.

mod dtype;
mod info;
pub mod layout;
mod quantization;
mod shape;

pub use dtype::DataType;
pub use info::TensorInfo;
pub use layout::DataLayout;
pub use quantization::QuantizationParams;
pub use shape::{TensorShape, MAX_NUM_OF_TENSOR_DIMENSIONS};
