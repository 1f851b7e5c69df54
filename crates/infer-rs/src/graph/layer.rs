//! Layer identities, slot references and the closed set of operator payloads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::descriptors::{
    ConstTensor, FullyConnectedDescriptor, L2NormalizationDescriptor, Pooling2dDescriptor,
    SliceDescriptor,
};
use super::visitor::LayerVisitor;
use crate::tensor::TensorInfo;

/// Index of a layer inside its owning [`Graph`](super::Graph) arena. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique layer identity. Cloned layers receive a fresh guid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerGuid(u64);

impl LayerGuid {
    fn next() -> Self {
        static NEXT_GUID: AtomicU64 = AtomicU64::new(1);
        LayerGuid(NEXT_GUID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// User-facing identifier that binds an input or output layer to caller memory.
pub type LayerBindingId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputSlotRef {
    pub layer: LayerId,
    pub slot: usize,
}

impl OutputSlotRef {
    pub fn new(layer: LayerId, slot: usize) -> Self {
        Self { layer, slot }
    }
}

impl fmt::Display for OutputSlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.out[{}]", self.layer, self.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputSlotRef {
    pub layer: LayerId,
    pub slot: usize,
}

impl InputSlotRef {
    pub fn new(layer: LayerId, slot: usize) -> Self {
        Self { layer, slot }
    }
}

impl fmt::Display for InputSlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.in[{}]", self.layer, self.slot)
    }
}

/// Fieldless tag of [`LayerKind`], used to key backend kernel tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    Input,
    Output,
    Addition,
    Multiplication,
    FullyConnected,
    Pooling2d,
    L2Normalization,
    Slice,
    GatherNd,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 9] = [
        OperatorKind::Input,
        OperatorKind::Output,
        OperatorKind::Addition,
        OperatorKind::Multiplication,
        OperatorKind::FullyConnected,
        OperatorKind::Pooling2d,
        OperatorKind::L2Normalization,
        OperatorKind::Slice,
        OperatorKind::GatherNd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperatorKind::Input => "Input",
            OperatorKind::Output => "Output",
            OperatorKind::Addition => "Addition",
            OperatorKind::Multiplication => "Multiplication",
            OperatorKind::FullyConnected => "FullyConnected",
            OperatorKind::Pooling2d => "Pooling2d",
            OperatorKind::L2Normalization => "L2Normalization",
            OperatorKind::Slice => "Slice",
            OperatorKind::GatherNd => "GatherNd",
        }
    }

    /// Boundary kinds bind caller memory and never produce a workload.
    pub fn is_boundary(self) -> bool {
        matches!(self, OperatorKind::Input | OperatorKind::Output)
    }

    pub fn num_inputs(self) -> usize {
        match self {
            OperatorKind::Input => 0,
            OperatorKind::Output
            | OperatorKind::FullyConnected
            | OperatorKind::Pooling2d
            | OperatorKind::L2Normalization
            | OperatorKind::Slice => 1,
            OperatorKind::Addition | OperatorKind::Multiplication | OperatorKind::GatherNd => 2,
        }
    }

    pub fn num_outputs(self) -> usize {
        match self {
            OperatorKind::Output => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operator payload of a layer. Set at creation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Input {
        binding: LayerBindingId,
    },
    Output {
        binding: LayerBindingId,
    },
    Addition,
    Multiplication,
    FullyConnected {
        descriptor: FullyConnectedDescriptor,
        weights: ConstTensor,
        bias: Option<ConstTensor>,
    },
    Pooling2d(Pooling2dDescriptor),
    L2Normalization(L2NormalizationDescriptor),
    Slice(SliceDescriptor),
    GatherNd,
}

impl LayerKind {
    pub fn operator(&self) -> OperatorKind {
        match self {
            LayerKind::Input { .. } => OperatorKind::Input,
            LayerKind::Output { .. } => OperatorKind::Output,
            LayerKind::Addition => OperatorKind::Addition,
            LayerKind::Multiplication => OperatorKind::Multiplication,
            LayerKind::FullyConnected { .. } => OperatorKind::FullyConnected,
            LayerKind::Pooling2d(_) => OperatorKind::Pooling2d,
            LayerKind::L2Normalization(_) => OperatorKind::L2Normalization,
            LayerKind::Slice(_) => OperatorKind::Slice,
            LayerKind::GatherNd => OperatorKind::GatherNd,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.operator().num_inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.operator().num_outputs()
    }

    /// Binding id of boundary layers.
    pub fn binding_id(&self) -> Option<LayerBindingId> {
        match self {
            LayerKind::Input { binding } | LayerKind::Output { binding } => Some(*binding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OutputSlot {
    pub(crate) info: TensorInfo,
    /// Set when the caller fixed the slot info; inference then only fills in the shape.
    pub(crate) declared: bool,
}

/// A named graph node with a fixed number of slots.
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    guid: LayerGuid,
    kind: LayerKind,
    pub(crate) outputs: Vec<OutputSlot>,
    backend_hint: Option<String>,
}

impl Layer {
    pub(crate) fn new(kind: LayerKind, name: impl Into<String>) -> Self {
        let outputs = vec![OutputSlot::default(); kind.num_outputs()];
        Self {
            name: name.into(),
            guid: LayerGuid::next(),
            kind,
            outputs,
            backend_hint: None,
        }
    }

    /// Copy with a fresh guid; declared output infos and the backend hint carry over.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            guid: LayerGuid::next(),
            kind: self.kind.clone(),
            outputs: self.outputs.clone(),
            backend_hint: self.backend_hint.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guid(&self) -> LayerGuid {
        self.guid
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn operator(&self) -> OperatorKind {
        self.kind.operator()
    }

    pub fn num_inputs(&self) -> usize {
        self.kind.num_inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn binding_id(&self) -> Option<LayerBindingId> {
        self.kind.binding_id()
    }

    pub fn output_info(&self, slot: usize) -> Option<&TensorInfo> {
        self.outputs.get(slot).map(|output| &output.info)
    }

    pub fn output_infos(&self) -> impl Iterator<Item = &TensorInfo> {
        self.outputs.iter().map(|output| &output.info)
    }

    /// Pins backend assignment for this layer to the named backend.
    pub fn set_backend_hint(&mut self, backend: impl Into<String>) {
        self.backend_hint = Some(backend.into());
    }

    pub fn clear_backend_hint(&mut self) {
        self.backend_hint = None;
    }

    pub fn backend_hint(&self) -> Option<&str> {
        self.backend_hint.as_deref()
    }

    /// Dispatches to the visitor method matching this layer's kind.
    pub fn accept(&self, visitor: &mut dyn LayerVisitor) {
        match &self.kind {
            LayerKind::Input { binding } => visitor.visit_input(self, *binding),
            LayerKind::Output { binding } => visitor.visit_output(self, *binding),
            LayerKind::Addition => visitor.visit_addition(self),
            LayerKind::Multiplication => visitor.visit_multiplication(self),
            LayerKind::FullyConnected {
                descriptor,
                weights,
                bias,
            } => visitor.visit_fully_connected(self, descriptor, weights, bias.as_ref()),
            LayerKind::Pooling2d(descriptor) => visitor.visit_pooling2d(self, descriptor),
            LayerKind::L2Normalization(descriptor) => {
                visitor.visit_l2_normalization(self, descriptor)
            }
            LayerKind::Slice(descriptor) => visitor.visit_slice(self, descriptor),
            LayerKind::GatherNd => visitor.visit_gather_nd(self),
        }
    }
}
