use thiserror::Error;

use crate::backend::BackendError;
use crate::error::{GraphError, InvalidArgument, LayerValidationError};
use crate::graph::LayerBindingId;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Validation(#[from] LayerValidationError),
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error("backend '{0}' is not registered")]
    UnknownBackend(String),
    #[error("no backends to load the network onto")]
    NoBackends,
    #[error("layer '{layer}': {source}")]
    Backend {
        layer: String,
        #[source]
        source: BackendError,
    },
    #[error("no input layer is bound to id {0}")]
    UnknownInput(LayerBindingId),
    #[error("no output layer is bound to id {0}")]
    UnknownOutput(LayerBindingId),
    #[error("{direction} binding id {binding} is used by more than one layer")]
    DuplicateBinding {
        direction: &'static str,
        binding: LayerBindingId,
    },
    #[error("input {0} was never set")]
    InputNotSet(LayerBindingId),
    #[error("invalid network options: {0}")]
    Options(#[from] serde_json::Error),
}

impl RuntimeError {
    pub(crate) fn backend(layer: impl Into<String>, source: BackendError) -> Self {
        RuntimeError::Backend {
            layer: layer.into(),
            source,
        }
    }
}

/// Convenience alias for results returned by the runtime.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
