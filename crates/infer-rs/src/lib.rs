extern crate self as infer_rs;

pub mod backend;
pub mod error;
pub mod graph;
pub mod runtime;
pub mod tensor;
mod env;

pub use backend::{Support, Workload, WorkloadFactory};
pub use error::{GraphError, InvalidArgument, LayerValidationError};
pub use graph::{Graph, LayerId, LayerKind, OperatorKind};
pub use runtime::{LoadedNetwork, NetworkOptions, RuntimeError, RuntimeResult};
pub use tensor::{DataType, TensorInfo, TensorShape};
