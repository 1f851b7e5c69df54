//! Backend-agnostic workload abstraction and factory dispatch.

mod assign;
pub mod codec;
mod error;
mod factory;
mod handle;
pub mod registry;
mod workload;

pub use assign::select_backend;
pub use codec::{decode_f32, encode_f32, make_decoder, make_encoder, Decoder, Encoder};
pub use error::{BackendError, BackendResult, Support};
pub use factory::{CreateFn, KernelTable, ValidateFn, WorkloadFactory, WorkloadRequest};
pub use handle::TensorHandle;
pub use workload::{
    check_memory, configured, Adapters, BaseWorkload, WorkingMemDescriptor, Workload,
    WorkloadInfo,
};
