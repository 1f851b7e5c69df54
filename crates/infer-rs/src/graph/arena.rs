use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use super::layer::{InputSlotRef, Layer, LayerBindingId, LayerId, LayerKind, OutputSlotRef};
use super::validate;
use super::visitor::LayerVisitor;
use crate::error::{GraphError, LayerValidationError};
use crate::tensor::TensorInfo;

/// One producer-to-consumer edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: OutputSlotRef,
    pub to: InputSlotRef,
}

/// Directed acyclic graph of layers.
///
/// Layers live in an arena indexed by [`LayerId`]; removed slots stay empty so ids are never
/// reused. Connections are kept in insertion order, which [`Graph::deep_clone`] replays.
/// `Clone` produces an exact copy (same ids and guids); use [`Graph::deep_clone`] for a copy
/// with fresh layer identities.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    layers: Vec<Option<Layer>>,
    connections: Vec<Connection>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, kind: LayerKind, name: impl Into<String>) -> LayerId {
        self.insert(Layer::new(kind, name))
    }

    /// Adds an input boundary layer with its declared tensor info.
    pub fn add_input_layer(
        &mut self,
        binding: LayerBindingId,
        name: impl Into<String>,
        info: TensorInfo,
    ) -> LayerId {
        let id = self.add_layer(LayerKind::Input { binding }, name);
        if let Some(Some(layer)) = self.layers.get_mut(id.0) {
            layer.outputs[0].info = info;
            layer.outputs[0].declared = true;
        }
        id
    }

    pub fn add_output_layer(
        &mut self,
        binding: LayerBindingId,
        name: impl Into<String>,
    ) -> LayerId {
        self.add_layer(LayerKind::Output { binding }, name)
    }

    fn insert(&mut self, layer: Layer) -> LayerId {
        let id = LayerId(self.layers.len());
        self.layers.push(Some(layer));
        id
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer, GraphError> {
        self.layers
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(GraphError::UnknownLayer(id))
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, GraphError> {
        self.layers
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownLayer(id))
    }

    /// Live layers in id order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|layer| (LayerId(index), layer)))
    }

    pub fn num_layers(&self) -> usize {
        self.layers.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Removes a layer together with every edge touching it.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer, GraphError> {
        let layer = self
            .layers
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(GraphError::UnknownLayer(id))?;
        self.connections
            .retain(|edge| edge.from.layer != id && edge.to.layer != id);
        Ok(layer)
    }

    /// Fixes the info of an output slot. Inference keeps the declared type and quantization.
    pub fn set_output_info(
        &mut self,
        slot: OutputSlotRef,
        info: TensorInfo,
    ) -> Result<(), GraphError> {
        let layer = self.layer_mut(slot.layer)?;
        let output = layer
            .outputs
            .get_mut(slot.slot)
            .ok_or(GraphError::OutputSlotOutOfRange {
                layer: slot.layer,
                slot: slot.slot,
            })?;
        output.info = info;
        output.declared = true;
        Ok(())
    }

    pub fn output_info(&self, slot: OutputSlotRef) -> Result<&TensorInfo, GraphError> {
        self.layer(slot.layer)?
            .output_info(slot.slot)
            .ok_or(GraphError::OutputSlotOutOfRange {
                layer: slot.layer,
                slot: slot.slot,
            })
    }

    fn check_output(&self, slot: OutputSlotRef) -> Result<(), GraphError> {
        if slot.slot >= self.layer(slot.layer)?.num_outputs() {
            return Err(GraphError::OutputSlotOutOfRange {
                layer: slot.layer,
                slot: slot.slot,
            });
        }
        Ok(())
    }

    fn check_input(&self, slot: InputSlotRef) -> Result<(), GraphError> {
        if slot.slot >= self.layer(slot.layer)?.num_inputs() {
            return Err(GraphError::InputSlotOutOfRange {
                layer: slot.layer,
                slot: slot.slot,
            });
        }
        Ok(())
    }

    /// Connects an output slot to an input slot.
    ///
    /// Rejects already connected inputs and edges that would close a cycle; on error the edge
    /// set is unchanged.
    pub fn connect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> Result<(), GraphError> {
        self.check_output(from)?;
        self.check_input(to)?;
        if self.producer(to).is_some() {
            return Err(GraphError::AlreadyConnected(to));
        }
        if self.reaches(to.layer, from.layer) {
            return Err(GraphError::Cycle { from, to });
        }
        self.connections.push(Connection { from, to });
        Ok(())
    }

    pub fn disconnect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> Result<(), GraphError> {
        self.check_output(from)?;
        self.check_input(to)?;
        let position = self
            .connections
            .iter()
            .position(|edge| edge.from == from && edge.to == to)
            .ok_or(GraphError::NotConnected { from, to })?;
        self.connections.remove(position);
        Ok(())
    }

    /// Producer feeding `to`, if connected.
    pub fn producer(&self, to: InputSlotRef) -> Option<OutputSlotRef> {
        self.connections
            .iter()
            .find(|edge| edge.to == to)
            .map(|edge| edge.from)
    }

    pub fn consumers(&self, from: OutputSlotRef) -> Vec<InputSlotRef> {
        self.connections
            .iter()
            .filter(|edge| edge.from == from)
            .map(|edge| edge.to)
            .collect()
    }

    /// True when `target` is reachable from `start` along existing edges (or is `start`).
    fn reaches(&self, start: LayerId, target: LayerId) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.layers.len()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            stack.extend(
                self.connections
                    .iter()
                    .filter(|edge| edge.from.layer == id)
                    .map(|edge| edge.to.layer),
            );
        }
        false
    }

    /// Kahn ordering; ties are broken by ascending layer id so the order is deterministic.
    pub fn topological_order(&self) -> Result<Vec<LayerId>, GraphError> {
        let mut in_degree: HashMap<LayerId, usize> =
            self.layers().map(|(id, _)| (id, 0)).collect();
        let mut successors: HashMap<LayerId, Vec<LayerId>> = HashMap::new();
        for edge in &self.connections {
            *in_degree.entry(edge.to.layer).or_insert(0) += 1;
            successors
                .entry(edge.from.layer)
                .or_default()
                .push(edge.to.layer);
        }

        let mut ready: BinaryHeap<Reverse<LayerId>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for next in successors.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*next));
                    }
                }
            }
        }

        if order.len() != in_degree.len() {
            let stuck = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(&id, _)| id)
                .min()
                .unwrap_or(LayerId(0));
            return Err(GraphError::NotAcyclic(stuck));
        }
        Ok(order)
    }

    /// Resolved infos feeding each input slot of `id`, in slot order.
    pub fn input_infos(&self, id: LayerId) -> Result<Vec<TensorInfo>, LayerValidationError> {
        let layer = self
            .layer(id)
            .map_err(|err| LayerValidationError::new(id.to_string(), err.to_string()))?;
        (0..layer.num_inputs())
            .map(|slot| {
                let producer = self.producer(InputSlotRef::new(id, slot)).ok_or_else(|| {
                    LayerValidationError::new(
                        layer.name(),
                        format!("input slot {slot} must be connected"),
                    )
                })?;
                self.output_info(producer)
                    .cloned()
                    .map_err(|err| LayerValidationError::new(layer.name(), err.to_string()))
            })
            .collect()
    }

    /// Propagates output infos forward in topological order.
    ///
    /// Every input slot must be connected and every rule of the layer kind must hold. Running
    /// it twice yields the same infos.
    pub fn validate_tensor_shapes_from_inputs(&mut self) -> Result<(), LayerValidationError> {
        let order = self.topological_order().map_err(|err| {
            let name = match &err {
                GraphError::NotAcyclic(id) => self
                    .layer(*id)
                    .map(|layer| layer.name().to_owned())
                    .unwrap_or_else(|_| id.to_string()),
                _ => String::from("graph"),
            };
            LayerValidationError::new(name, err.to_string())
        })?;

        for id in order {
            let inputs = self.input_infos(id)?;
            let layer = self
                .layer(id)
                .map_err(|err| LayerValidationError::new(id.to_string(), err.to_string()))?;
            let inferred = validate::infer_output_infos(layer, &inputs)
                .map_err(|reason| LayerValidationError::new(layer.name(), reason))?;
            let layer = self
                .layer_mut(id)
                .map_err(|err| LayerValidationError::new(id.to_string(), err.to_string()))?;
            let name = layer.name().to_owned();
            for (slot, info) in layer.outputs.iter_mut().zip(inferred) {
                validate::resolve_output(slot, info)
                    .map_err(|reason| LayerValidationError::new(name.as_str(), reason))?;
            }
        }
        Ok(())
    }

    /// Copies one layer into `target` with a fresh guid and no connections.
    pub fn clone_layer(&self, id: LayerId, target: &mut Graph) -> Result<LayerId, GraphError> {
        let layer = self.layer(id)?.duplicate();
        Ok(target.insert(layer))
    }

    /// Clones every layer, then replays connections in insertion order.
    ///
    /// Returns the new graph and the old-to-new id mapping.
    pub fn deep_clone(&self) -> (Graph, HashMap<LayerId, LayerId>) {
        let mut target = Graph::new();
        let mapping: HashMap<LayerId, LayerId> = self
            .layers()
            .map(|(id, layer)| (id, target.insert(layer.duplicate())))
            .collect();
        for edge in &self.connections {
            if let (Some(&from), Some(&to)) =
                (mapping.get(&edge.from.layer), mapping.get(&edge.to.layer))
            {
                target.connections.push(Connection {
                    from: OutputSlotRef::new(from, edge.from.slot),
                    to: InputSlotRef::new(to, edge.to.slot),
                });
            }
        }
        (target, mapping)
    }

    /// `(binding, layer)` pairs of every input boundary layer, in id order.
    pub fn input_layers(&self) -> Vec<(LayerBindingId, LayerId)> {
        self.layers()
            .filter_map(|(id, layer)| match layer.kind() {
                LayerKind::Input { binding } => Some((*binding, id)),
                _ => None,
            })
            .collect()
    }

    pub fn output_layers(&self) -> Vec<(LayerBindingId, LayerId)> {
        self.layers()
            .filter_map(|(id, layer)| match layer.kind() {
                LayerKind::Output { binding } => Some((*binding, id)),
                _ => None,
            })
            .collect()
    }

    pub fn input_layer(&self, binding: LayerBindingId) -> Option<LayerId> {
        self.input_layers()
            .into_iter()
            .find_map(|(candidate, id)| (candidate == binding).then_some(id))
    }

    pub fn output_layer(&self, binding: LayerBindingId) -> Option<LayerId> {
        self.output_layers()
            .into_iter()
            .find_map(|(candidate, id)| (candidate == binding).then_some(id))
    }

    /// Visits every layer in topological order.
    pub fn accept(&self, visitor: &mut dyn LayerVisitor) -> Result<(), GraphError> {
        for id in self.topological_order()? {
            self.layer(id)?.accept(visitor);
        }
        Ok(())
    }
}
