use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::error::{RuntimeError, RuntimeResult};
use super::options::NetworkOptions;
use crate::backend::{
    registry, select_backend, TensorHandle, WorkingMemDescriptor, Workload, WorkloadFactory,
    WorkloadRequest,
};
use crate::error::LayerValidationError;
use crate::graph::{Graph, InputSlotRef, LayerBindingId, LayerId, OutputSlotRef};

struct Step {
    layer: LayerId,
    name: String,
    backend: usize,
    workload: Box<dyn Workload>,
    inputs: Vec<OutputSlotRef>,
    outputs: Vec<OutputSlotRef>,
}

/// A graph bound to backends: one configured workload per compute layer plus the tensor
/// memory connecting them.
///
/// The network is `Send` but not `Sync`; one invocation runs at a time.
pub struct LoadedNetwork {
    graph: Graph,
    options: NetworkOptions,
    factories: Vec<Box<dyn WorkloadFactory>>,
    tensors: HashMap<OutputSlotRef, TensorHandle>,
    inputs: BTreeMap<LayerBindingId, OutputSlotRef>,
    outputs: BTreeMap<LayerBindingId, OutputSlotRef>,
    inputs_set: BTreeSet<LayerBindingId>,
    steps: Vec<Step>,
}

impl LoadedNetwork {
    /// Loads `graph` onto the registered backends named by `options.backend_preferences`.
    pub fn load(graph: &Graph, options: NetworkOptions) -> RuntimeResult<Self> {
        let factories = options
            .backend_preferences
            .iter()
            .map(|name| {
                registry::create_factory(name)
                    .ok_or_else(|| RuntimeError::UnknownBackend(name.clone()))
            })
            .collect::<RuntimeResult<Vec<_>>>()?;
        Self::load_with_factories(graph, factories, options)
    }

    /// Loads `graph` onto explicit factories, tried in the given order.
    pub fn load_with_factories(
        graph: &Graph,
        factories: Vec<Box<dyn WorkloadFactory>>,
        options: NetworkOptions,
    ) -> RuntimeResult<Self> {
        if factories.is_empty() {
            return Err(RuntimeError::NoBackends);
        }
        let mut graph = graph.clone();
        graph.validate_tensor_shapes_from_inputs()?;
        let order = graph.topological_order()?;

        let mut tensors = HashMap::new();
        for &id in &order {
            let layer = graph.layer(id)?;
            for slot in 0..layer.num_outputs() {
                let slot = OutputSlotRef::new(id, slot);
                let info = graph.output_info(slot)?.clone();
                tensors.insert(slot, TensorHandle::allocate(info));
            }
        }

        let mut inputs = BTreeMap::new();
        for (binding, id) in graph.input_layers() {
            if inputs.insert(binding, OutputSlotRef::new(id, 0)).is_some() {
                return Err(RuntimeError::DuplicateBinding {
                    direction: "input",
                    binding,
                });
            }
        }
        let mut outputs = BTreeMap::new();
        for (binding, id) in graph.output_layers() {
            let producer = producer_of(&graph, InputSlotRef::new(id, 0))?;
            if outputs.insert(binding, producer).is_some() {
                return Err(RuntimeError::DuplicateBinding {
                    direction: "output",
                    binding,
                });
            }
        }

        let mut steps = Vec::new();
        for &id in &order {
            let layer = graph.layer(id)?;
            if layer.operator().is_boundary() {
                continue;
            }
            let name = layer.name().to_owned();
            let mut request = WorkloadRequest::from_graph(&graph, id)?;
            let backend = select_backend(&mut request, layer.backend_hint(), &factories)
                .map_err(|source| RuntimeError::backend(name.as_str(), source))?;

            let step_inputs = (0..layer.num_inputs())
                .map(|slot| producer_of(&graph, InputSlotRef::new(id, slot)))
                .collect::<RuntimeResult<Vec<_>>>()?;
            let step_outputs = (0..layer.num_outputs())
                .map(|slot| OutputSlotRef::new(id, slot))
                .collect::<Vec<_>>();
            let memory = bind(&tensors, &step_inputs, &step_outputs);

            let mut workload = factories[backend]
                .create_workload(&request, memory)
                .map_err(|source| RuntimeError::backend(name.as_str(), source))?;
            workload
                .configure()
                .map_err(|source| RuntimeError::backend(name.as_str(), source))?;
            steps.push(Step {
                layer: id,
                name,
                backend,
                workload,
                inputs: step_inputs,
                outputs: step_outputs,
            });
        }

        tracing::info!(
            layers = graph.num_layers(),
            workloads = steps.len(),
            backends = ?factories.iter().map(|f| f.backend_id()).collect::<Vec<_>>(),
            "network loaded"
        );

        Ok(Self {
            graph,
            options,
            factories,
            tensors,
            inputs,
            outputs,
            inputs_set: BTreeSet::new(),
            steps,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    /// Backend id that runs `layer`, or `None` for boundary and unknown layers.
    pub fn backend_for(&self, layer: LayerId) -> Option<&str> {
        self.steps
            .iter()
            .find(|step| step.layer == layer)
            .map(|step| self.factories[step.backend].backend_id())
    }

    /// Encodes `values` into the tensor bound to input `binding`.
    pub fn set_input_f32(&mut self, binding: LayerBindingId, values: &[f32]) -> RuntimeResult<()> {
        let handle = input_handle(&self.inputs, &self.tensors, binding)?;
        handle.write_f32(values)?;
        self.inputs_set.insert(binding);
        Ok(())
    }

    /// Decodes the tensor feeding output `binding`.
    pub fn output_f32(&self, binding: LayerBindingId) -> RuntimeResult<Vec<f32>> {
        let handle = output_handle(&self.outputs, &self.tensors, binding)?;
        Ok(handle.read_f32()?)
    }

    /// Runs every workload once against the memory bound at load time.
    pub fn execute(&self) -> RuntimeResult<()> {
        if self.options.validate_memory {
            check_inputs_set(&self.inputs, &self.inputs_set)?;
        }
        for step in &self.steps {
            tracing::trace!(layer = %step.name, workload = step.workload.name(), "execute");
            step.workload
                .execute()
                .map_err(|source| RuntimeError::backend(step.name.as_str(), source))?;
        }
        Ok(())
    }

    /// Fresh, zeroed memory for one [`execute_async`](Self::execute_async) binding.
    pub fn create_working_memory(&self) -> WorkingMemory {
        let tensors = self
            .tensors
            .iter()
            .map(|(slot, handle)| (*slot, TensorHandle::allocate(handle.info().clone())))
            .collect();
        WorkingMemory {
            tensors,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            inputs_set: BTreeSet::new(),
        }
    }

    /// Runs every workload once against `memory` instead of the load-time bindings.
    pub fn execute_async(&self, memory: &WorkingMemory) -> RuntimeResult<()> {
        if self.options.validate_memory {
            check_inputs_set(&memory.inputs, &memory.inputs_set)?;
        }
        for step in &self.steps {
            tracing::trace!(layer = %step.name, workload = step.workload.name(), "execute async");
            let bound = bind(&memory.tensors, &step.inputs, &step.outputs);
            step.workload
                .execute_async(&bound)
                .map_err(|source| RuntimeError::backend(step.name.as_str(), source))?;
        }
        Ok(())
    }
}

/// Per-invocation tensor memory created by [`LoadedNetwork::create_working_memory`].
pub struct WorkingMemory {
    tensors: HashMap<OutputSlotRef, TensorHandle>,
    inputs: BTreeMap<LayerBindingId, OutputSlotRef>,
    outputs: BTreeMap<LayerBindingId, OutputSlotRef>,
    inputs_set: BTreeSet<LayerBindingId>,
}

impl WorkingMemory {
    pub fn set_input_f32(&mut self, binding: LayerBindingId, values: &[f32]) -> RuntimeResult<()> {
        let handle = input_handle(&self.inputs, &self.tensors, binding)?;
        handle.write_f32(values)?;
        self.inputs_set.insert(binding);
        Ok(())
    }

    pub fn output_f32(&self, binding: LayerBindingId) -> RuntimeResult<Vec<f32>> {
        let handle = output_handle(&self.outputs, &self.tensors, binding)?;
        Ok(handle.read_f32()?)
    }
}

fn producer_of(graph: &Graph, to: InputSlotRef) -> RuntimeResult<OutputSlotRef> {
    graph.producer(to).ok_or_else(|| {
        let name = graph
            .layer(to.layer)
            .map(|layer| layer.name().to_owned())
            .unwrap_or_else(|_| to.layer.to_string());
        LayerValidationError::new(name, format!("input slot {} must be connected", to.slot)).into()
    })
}

fn bind(
    tensors: &HashMap<OutputSlotRef, TensorHandle>,
    inputs: &[OutputSlotRef],
    outputs: &[OutputSlotRef],
) -> WorkingMemDescriptor {
    let lookup = |slots: &[OutputSlotRef]| -> Vec<TensorHandle> {
        slots
            .iter()
            .filter_map(|slot| tensors.get(slot).cloned())
            .collect()
    };
    WorkingMemDescriptor::new(lookup(inputs), lookup(outputs))
}

fn input_handle<'a>(
    inputs: &BTreeMap<LayerBindingId, OutputSlotRef>,
    tensors: &'a HashMap<OutputSlotRef, TensorHandle>,
    binding: LayerBindingId,
) -> RuntimeResult<&'a TensorHandle> {
    inputs
        .get(&binding)
        .and_then(|slot| tensors.get(slot))
        .ok_or(RuntimeError::UnknownInput(binding))
}

fn output_handle<'a>(
    outputs: &BTreeMap<LayerBindingId, OutputSlotRef>,
    tensors: &'a HashMap<OutputSlotRef, TensorHandle>,
    binding: LayerBindingId,
) -> RuntimeResult<&'a TensorHandle> {
    outputs
        .get(&binding)
        .and_then(|slot| tensors.get(slot))
        .ok_or(RuntimeError::UnknownOutput(binding))
}

fn check_inputs_set(
    inputs: &BTreeMap<LayerBindingId, OutputSlotRef>,
    set: &BTreeSet<LayerBindingId>,
) -> RuntimeResult<()> {
    match inputs.keys().find(|binding| !set.contains(binding)) {
        Some(&binding) => Err(RuntimeError::InputNotSet(binding)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        configured, Adapters, BackendResult, BaseWorkload, KernelTable, Support,
    };
    use crate::graph::{LayerKind, OperatorKind};
    use crate::tensor::{DataType, TensorInfo, TensorShape};

    struct AddWorkload {
        base: BaseWorkload<()>,
        adapters: Option<Adapters>,
    }

    fn add(memory: &WorkingMemDescriptor, adapters: &Adapters) -> BackendResult<()> {
        let inputs = adapters.decode_inputs(memory);
        let sum = inputs[0].iter().zip(&inputs[1]).map(|(a, b)| a + b).collect();
        adapters.encode_outputs(memory, &[sum])
    }

    impl Workload for AddWorkload {
        fn name(&self) -> &str {
            &self.base.layer
        }

        fn configure(&mut self) -> BackendResult<()> {
            self.adapters = Some(Adapters::resolve(&self.base.info)?);
            Ok(())
        }

        fn execute(&self) -> BackendResult<()> {
            add(&self.base.memory, configured(&self.adapters, &self.base.layer)?)
        }

        fn execute_async(&self, memory: &WorkingMemDescriptor) -> BackendResult<()> {
            self.base.check(memory)?;
            add(memory, &Adapters::for_memory(memory)?)
        }
    }

    struct Adder(KernelTable);

    impl WorkloadFactory for Adder {
        fn backend_id(&self) -> &str {
            self.0.backend()
        }

        fn is_layer_supported(
            &self,
            kind: &LayerKind,
            inputs: &[TensorInfo],
            outputs: &[TensorInfo],
        ) -> Support {
            self.0.validate(kind, inputs, outputs)
        }

        fn create_workload(
            &self,
            request: &WorkloadRequest,
            memory: WorkingMemDescriptor,
        ) -> BackendResult<Box<dyn Workload>> {
            self.0.create(request, memory)
        }
    }

    fn accept_all(_: &LayerKind, _: &[TensorInfo], _: &[TensorInfo]) -> Support {
        Support::Supported
    }

    fn create_add(
        request: &WorkloadRequest,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>> {
        let base = BaseWorkload::new(request.layer_name(), (), request.info().clone(), memory)?;
        Ok(Box::new(AddWorkload {
            base,
            adapters: None,
        }))
    }

    fn adder(name: &str) -> Box<dyn WorkloadFactory> {
        Box::new(Adder(KernelTable::new(name).register(
            OperatorKind::Addition,
            accept_all,
            create_add,
        )))
    }

    fn sum_graph() -> (Graph, LayerId) {
        let info = TensorInfo::new(TensorShape::new(&[3]).unwrap(), DataType::Float32);
        let mut graph = Graph::new();
        let a = graph.add_input_layer(0, "a", info.clone());
        let b = graph.add_input_layer(1, "b", info);
        let sum = graph.add_layer(LayerKind::Addition, "sum");
        let out = graph.add_output_layer(0, "out");
        graph
            .connect(OutputSlotRef::new(a, 0), InputSlotRef::new(sum, 0))
            .unwrap();
        graph
            .connect(OutputSlotRef::new(b, 0), InputSlotRef::new(sum, 1))
            .unwrap();
        graph
            .connect(OutputSlotRef::new(sum, 0), InputSlotRef::new(out, 0))
            .unwrap();
        (graph, sum)
    }

    fn options() -> NetworkOptions {
        NetworkOptions {
            backend_preferences: Vec::new(),
            validate_memory: true,
        }
    }

    #[test]
    fn executes_bound_and_per_call_memory() {
        let (graph, sum) = sum_graph();
        let mut network =
            LoadedNetwork::load_with_factories(&graph, vec![adder("adder")], options()).unwrap();
        assert_eq!(network.backend_for(sum), Some("adder"));

        network.set_input_f32(0, &[1.0, 2.0, 3.0]).unwrap();
        network.set_input_f32(1, &[10.0, 20.0, 30.0]).unwrap();
        network.execute().unwrap();
        assert_eq!(network.output_f32(0).unwrap(), vec![11.0, 22.0, 33.0]);

        let mut memory = network.create_working_memory();
        memory.set_input_f32(0, &[1.0, 1.0, 1.0]).unwrap();
        memory.set_input_f32(1, &[2.0, 2.0, 2.0]).unwrap();
        network.execute_async(&memory).unwrap();
        assert_eq!(memory.output_f32(0).unwrap(), vec![3.0, 3.0, 3.0]);
        assert_eq!(network.output_f32(0).unwrap(), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn unset_inputs_and_unknown_bindings_are_reported() {
        let (graph, _) = sum_graph();
        let mut network =
            LoadedNetwork::load_with_factories(&graph, vec![adder("adder")], options()).unwrap();
        network.set_input_f32(0, &[0.0; 3]).unwrap();
        assert!(matches!(network.execute(), Err(RuntimeError::InputNotSet(1))));
        assert!(matches!(
            network.set_input_f32(7, &[0.0; 3]),
            Err(RuntimeError::UnknownInput(7))
        ));
        assert!(matches!(network.output_f32(3), Err(RuntimeError::UnknownOutput(3))));
        assert!(matches!(
            network.set_input_f32(1, &[0.0; 2]),
            Err(RuntimeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn hints_pin_and_empty_factory_lists_fail() {
        let (mut graph, sum) = sum_graph();
        assert!(matches!(
            LoadedNetwork::load_with_factories(&graph, Vec::new(), options()),
            Err(RuntimeError::NoBackends)
        ));

        graph.layer_mut(sum).unwrap().set_backend_hint("second");
        let network = LoadedNetwork::load_with_factories(
            &graph,
            vec![adder("first"), adder("second")],
            options(),
        )
        .unwrap();
        assert_eq!(network.backend_for(sum), Some("second"));

        graph.layer_mut(sum).unwrap().set_backend_hint("missing");
        let err = LoadedNetwork::load_with_factories(&graph, vec![adder("first")], options())
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::Backend { ref layer, .. } if layer == "sum"));
    }

    #[test]
    fn duplicate_bindings_are_rejected() {
        let (mut graph, sum) = sum_graph();
        let second_out = graph.add_output_layer(0, "out2");
        graph
            .connect(OutputSlotRef::new(sum, 0), InputSlotRef::new(second_out, 0))
            .unwrap();
        let err = LoadedNetwork::load_with_factories(&graph, vec![adder("first")], options())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RuntimeError::DuplicateBinding {
                direction: "output",
                binding: 0
            }
        ));

        let (mut graph, _) = sum_graph();
        let info = TensorInfo::new(TensorShape::new(&[3]).unwrap(), DataType::Float32);
        graph.add_input_layer(1, "b2", info);
        let err = LoadedNetwork::load_with_factories(&graph, vec![adder("first")], options())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RuntimeError::DuplicateBinding {
                direction: "input",
                binding: 1
            }
        ));
    }
}
