//! Error taxonomy shared by the descriptor and graph layers.
//!
//! Backend-side failures live in [`crate::backend::BackendError`]; runtime failures that wrap
//! both live in [`crate::runtime::RuntimeError`].

use thiserror::Error;

use crate::graph::{InputSlotRef, LayerId, OutputSlotRef};
use crate::tensor::DataType;

/// Malformed descriptor construction or an out-of-range index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    #[error("tensor number of dimensions must be greater than 0")]
    ZeroRank,
    #[error("tensor number of dimensions {rank} exceeds the maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },
    #[error("tensor dimension sizes missing: expected {expected}, got {found}")]
    MissingDimensionSizes { expected: usize, found: usize },
    #[error("invalid dimension index: {index} (number of dimensions is {rank})")]
    DimensionIndex { index: usize, rank: usize },
    #[error("invalid axis {axis} for {rank}D tensor")]
    Axis { axis: i64, rank: usize },
    #[error("invalid axis range [{first}, {last}) for {rank}D tensor")]
    AxisRange {
        first: usize,
        last: usize,
        rank: usize,
    },
    #[error("quantization scales must not be empty")]
    EmptyScales,
    #[error("{count} quantization scales require a quantization axis")]
    MissingQuantizationAxis { count: usize },
    #[error("per-axis quantization is not allowed for data type {0}")]
    PerAxisOnNonInteger(DataType),
    #[error("per-axis quantization params not set for tensor of type {0}")]
    PerAxisParamsMissing(DataType),
    #[error("tensor data holds {found} bytes, descriptor requires {expected}")]
    DataSize { expected: usize, found: usize },
    #[error("expected {expected} elements, got {found}")]
    ElementCount { expected: usize, found: usize },
    #[error("{found} quantization scales do not match dimension {axis} of extent {expected}")]
    ScaleCount {
        axis: usize,
        expected: usize,
        found: usize,
    },
}

/// Shape-inference or connectivity failure attributed to a named layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("layer '{layer}': {reason}")]
pub struct LayerValidationError {
    pub layer: String,
    pub reason: String,
}

impl LayerValidationError {
    pub fn new(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            reason: reason.into(),
        }
    }
}

/// Topology mutation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("layer {0} does not exist in this graph")]
    UnknownLayer(LayerId),
    #[error("layer {layer} has no output slot {slot}")]
    OutputSlotOutOfRange { layer: LayerId, slot: usize },
    #[error("layer {layer} has no input slot {slot}")]
    InputSlotOutOfRange { layer: LayerId, slot: usize },
    #[error("input slot {0} is already connected")]
    AlreadyConnected(InputSlotRef),
    #[error("connecting {from} -> {to} would introduce a cycle")]
    Cycle { from: OutputSlotRef, to: InputSlotRef },
    #[error("no connection {from} -> {to}")]
    NotConnected { from: OutputSlotRef, to: InputSlotRef },
    #[error("graph contains a cycle through layer {0}")]
    NotAcyclic(LayerId),
}
