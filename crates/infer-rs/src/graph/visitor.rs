use super::descriptors::{
    ConstTensor, FullyConnectedDescriptor, L2NormalizationDescriptor, Pooling2dDescriptor,
    SliceDescriptor,
};
use super::layer::{Layer, LayerBindingId};

/// Read-only walk over layers. Every method defaults to a no-op so visitors only override
/// the kinds they care about.
#[allow(unused_variables)]
pub trait LayerVisitor {
    fn visit_input(&mut self, layer: &Layer, binding: LayerBindingId) {}

    fn visit_output(&mut self, layer: &Layer, binding: LayerBindingId) {}

    fn visit_addition(&mut self, layer: &Layer) {}

    fn visit_multiplication(&mut self, layer: &Layer) {}

    fn visit_fully_connected(
        &mut self,
        layer: &Layer,
        descriptor: &FullyConnectedDescriptor,
        weights: &ConstTensor,
        bias: Option<&ConstTensor>,
    ) {
    }

    fn visit_pooling2d(&mut self, layer: &Layer, descriptor: &Pooling2dDescriptor) {}

    fn visit_l2_normalization(&mut self, layer: &Layer, descriptor: &L2NormalizationDescriptor) {}

    fn visit_slice(&mut self, layer: &Layer, descriptor: &SliceDescriptor) {}

    fn visit_gather_nd(&mut self, layer: &Layer) {}
}
