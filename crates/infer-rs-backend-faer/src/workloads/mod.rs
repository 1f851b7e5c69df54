//! Kernels for the faer backend. They plug into the reference backend's
//! [`KernelWorkload`](infer_rs_backend_ref_cpu::KernelWorkload), so decoding and encoding
//! behave exactly as on `cpu-ref`.

mod elementwise;
mod fully_connected;
mod slice;

pub use elementwise::FaerElementwise;
pub use fully_connected::FaerFullyConnected;
pub use slice::NativeSlice;

pub(crate) use elementwise::{create_addition, create_multiplication, validate_elementwise};
pub(crate) use fully_connected::{create_fully_connected, validate_fully_connected};
pub(crate) use slice::{create_slice, validate_slice};

use infer_rs::backend::Support;
use infer_rs::tensor::{DataType, TensorInfo};

/// Dense kernels compute in `f32` and only accept types that decode to it without loss of
/// meaning.
fn dense_types(infos: &[TensorInfo]) -> Support {
    match infos
        .iter()
        .find(|info| !matches!(info.data_type(), DataType::Float32 | DataType::QAsymmU8))
    {
        Some(info) => Support::unsupported(format!(
            "faer kernels run Float32 and QAsymmU8 only, got {}",
            info.data_type()
        )),
        None => Support::Supported,
    }
}
