use thiserror::Error;

use crate::error::InvalidArgument;
use crate::graph::OperatorKind;

/// Outcome of asking a backend whether it can run a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Support {
    Supported,
    /// The backend cannot run this configuration; another backend may.
    Unsupported(String),
    /// The request itself is ill-formed (wrong arity, unresolved infos).
    Malformed(String),
}

impl Support {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Support::Unsupported(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Support::Malformed(reason.into())
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Support::Supported)
    }

    /// Runs `next` only while still supported.
    pub fn and_then(self, next: impl FnOnce() -> Support) -> Support {
        match self {
            Support::Supported => next(),
            other => other,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Support::Supported => None,
            Support::Unsupported(reason) | Support::Malformed(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend '{backend}' does not support {operator}: {reason}")]
    Unsupported {
        backend: String,
        operator: OperatorKind,
        reason: String,
    },
    #[error("malformed workload for '{layer}': {reason}")]
    Malformed { layer: String, reason: String },
    #[error("workload request for '{layer}' was not validated by backend '{backend}'")]
    NotValidated { layer: String, backend: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
}

impl BackendError {
    pub fn unsupported(
        backend: impl Into<String>,
        operator: OperatorKind,
        reason: impl Into<String>,
    ) -> Self {
        BackendError::Unsupported {
            backend: backend.into(),
            operator,
            reason: reason.into(),
        }
    }

    pub fn malformed(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::Malformed {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    /// Unsupported errors are recoverable by trying another backend.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackendError::Unsupported { .. })
    }
}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;
