//! JSON rendering of a graph through the [`LayerVisitor`] interface.

use serde_json::{json, Map, Value};

use super::arena::Graph;
use super::descriptors::{
    ConstTensor, FullyConnectedDescriptor, L2NormalizationDescriptor, Pooling2dDescriptor,
    SliceDescriptor,
};
use super::layer::{Layer, LayerBindingId};
use super::visitor::LayerVisitor;
use crate::error::GraphError;

/// Collects one JSON object per visited layer.
#[derive(Debug, Default)]
pub struct GraphDescriber {
    layers: Vec<Value>,
}

impl GraphDescriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describes every layer of `graph` in topological order.
    pub fn describe(graph: &Graph) -> Result<Value, GraphError> {
        let mut describer = GraphDescriber::new();
        graph.accept(&mut describer)?;
        let connections = graph
            .connections()
            .iter()
            .map(|edge| json!({ "from": edge.from.to_string(), "to": edge.to.to_string() }))
            .collect::<Vec<_>>();
        Ok(json!({ "layers": describer.into_layers(), "connections": connections }))
    }

    pub fn into_layers(self) -> Vec<Value> {
        self.layers
    }

    fn push(&mut self, layer: &Layer, params: Option<Value>) {
        let mut entry = Map::new();
        entry.insert("name".into(), json!(layer.name()));
        entry.insert("guid".into(), json!(layer.guid().value()));
        entry.insert("kind".into(), json!(layer.operator().name()));
        let outputs: Vec<Value> = layer
            .output_infos()
            .map(|info| serde_json::to_value(info).unwrap_or(Value::Null))
            .collect();
        entry.insert("outputs".into(), Value::Array(outputs));
        if let Some(params) = params {
            entry.insert("params".into(), params);
        }
        if let Some(hint) = layer.backend_hint() {
            entry.insert("backend_hint".into(), json!(hint));
        }
        self.layers.push(Value::Object(entry));
    }
}

fn const_summary(tensor: &ConstTensor) -> Value {
    json!({
        "shape": tensor.info().shape().dims(),
        "data_type": tensor.info().data_type().name(),
    })
}

impl LayerVisitor for GraphDescriber {
    fn visit_input(&mut self, layer: &Layer, binding: LayerBindingId) {
        self.push(layer, Some(json!({ "binding": binding })));
    }

    fn visit_output(&mut self, layer: &Layer, binding: LayerBindingId) {
        self.push(layer, Some(json!({ "binding": binding })));
    }

    fn visit_addition(&mut self, layer: &Layer) {
        self.push(layer, None);
    }

    fn visit_multiplication(&mut self, layer: &Layer) {
        self.push(layer, None);
    }

    fn visit_fully_connected(
        &mut self,
        layer: &Layer,
        descriptor: &FullyConnectedDescriptor,
        weights: &ConstTensor,
        bias: Option<&ConstTensor>,
    ) {
        self.push(
            layer,
            Some(json!({
                "transpose_weight_matrix": descriptor.transpose_weight_matrix,
                "weights": const_summary(weights),
                "bias": bias.map(const_summary),
            })),
        );
    }

    fn visit_pooling2d(&mut self, layer: &Layer, descriptor: &Pooling2dDescriptor) {
        self.push(layer, serde_json::to_value(descriptor).ok());
    }

    fn visit_l2_normalization(&mut self, layer: &Layer, descriptor: &L2NormalizationDescriptor) {
        self.push(layer, serde_json::to_value(descriptor).ok());
    }

    fn visit_slice(&mut self, layer: &Layer, descriptor: &SliceDescriptor) {
        self.push(layer, serde_json::to_value(descriptor).ok());
    }

    fn visit_gather_nd(&mut self, layer: &Layer) {
        self.push(layer, None);
    }
}
