//! Layer graph: arena-owned layers, typed slots, connections and shape inference.

mod arena;
pub mod describe;
pub mod descriptors;
mod layer;
mod validate;
mod visitor;

pub use arena::{Connection, Graph};
pub use describe::GraphDescriber;
pub use descriptors::{
    ConstTensor, FullyConnectedDescriptor, L2NormalizationDescriptor, OutputShapeRounding,
    PaddingMethod, Pooling2dDescriptor, PoolingAlgorithm, SliceDescriptor,
};
pub use layer::{
    InputSlotRef, Layer, LayerBindingId, LayerGuid, LayerId, LayerKind, OperatorKind,
    OutputSlotRef,
};
pub use validate::{broadcast_shape, fully_connected_weight_extents};
pub use visitor::LayerVisitor;
