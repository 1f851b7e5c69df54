use std::collections::BTreeMap;

use super::error::{BackendError, BackendResult, Support};
use super::workload::{check_memory, WorkingMemDescriptor, Workload, WorkloadInfo};
use crate::error::LayerValidationError;
use crate::graph::{Graph, LayerId, LayerKind, OperatorKind, OutputSlotRef};
use crate::tensor::TensorInfo;

/// Per-backend entry point: validates layers and builds workloads for them.
pub trait WorkloadFactory: Send + Sync {
    /// Stable backend identifier, e.g. `"cpu-ref"`.
    fn backend_id(&self) -> &str;

    /// Reports whether this backend can run `kind` with the given infos. Never constructs
    /// anything.
    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Support;

    /// Builds a workload from a request previously stamped by this backend.
    fn create_workload(
        &self,
        request: &WorkloadRequest,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>>;
}

/// Everything a factory needs to build one layer's workload.
///
/// A request only becomes constructible after [`validate_with`](Self::validate_with) succeeds
/// against the backend that will build it.
#[derive(Debug, Clone)]
pub struct WorkloadRequest {
    layer: String,
    kind: LayerKind,
    info: WorkloadInfo,
    validated_by: Option<String>,
}

impl WorkloadRequest {
    pub fn new(layer: impl Into<String>, kind: LayerKind, info: WorkloadInfo) -> Self {
        Self {
            layer: layer.into(),
            kind,
            info,
            validated_by: None,
        }
    }

    /// Request for layer `id` with infos read from the graph's connected slots.
    pub fn from_graph(graph: &Graph, id: LayerId) -> Result<Self, LayerValidationError> {
        let inputs = graph.input_infos(id)?;
        let layer = graph
            .layer(id)
            .map_err(|err| LayerValidationError::new(id.to_string(), err.to_string()))?;
        let outputs = (0..layer.num_outputs())
            .map(|slot| {
                graph
                    .output_info(OutputSlotRef::new(id, slot))
                    .cloned()
                    .map_err(|err| LayerValidationError::new(layer.name(), err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            layer.name(),
            layer.kind().clone(),
            WorkloadInfo::new(inputs, outputs),
        ))
    }

    /// Asks `factory` for support and stamps the request on success. Any other outcome clears
    /// a previous stamp.
    pub fn validate_with(&mut self, factory: &dyn WorkloadFactory) -> Support {
        let support =
            factory.is_layer_supported(&self.kind, &self.info.inputs, &self.info.outputs);
        self.validated_by = support
            .is_supported()
            .then(|| factory.backend_id().to_owned());
        support
    }

    pub fn is_validated_by(&self, backend: &str) -> bool {
        self.validated_by.as_deref() == Some(backend)
    }

    pub fn validated_by(&self) -> Option<&str> {
        self.validated_by.as_deref()
    }

    pub fn layer_name(&self) -> &str {
        &self.layer
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn operator(&self) -> OperatorKind {
        self.kind.operator()
    }

    pub fn info(&self) -> &WorkloadInfo {
        &self.info
    }
}

pub type ValidateFn = fn(&LayerKind, &[TensorInfo], &[TensorInfo]) -> Support;
pub type CreateFn =
    fn(&WorkloadRequest, WorkingMemDescriptor) -> BackendResult<Box<dyn Workload>>;

#[derive(Clone, Copy)]
struct KernelEntry {
    validate: ValidateFn,
    create: CreateFn,
}

/// Operator-keyed dispatch table a backend builds once at construction.
///
/// The table owns the checks every backend shares: slot arity, resolved infos, the
/// validation stamp and the memory binding. Kernels only see requests that passed them.
#[derive(Clone)]
pub struct KernelTable {
    backend: String,
    entries: BTreeMap<OperatorKind, KernelEntry>,
}

impl KernelTable {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn register(
        mut self,
        operator: OperatorKind,
        validate: ValidateFn,
        create: CreateFn,
    ) -> Self {
        self.entries
            .insert(operator, KernelEntry { validate, create });
        self
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn operators(&self) -> impl Iterator<Item = OperatorKind> + '_ {
        self.entries.keys().copied()
    }

    pub fn validate(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Support {
        let operator = kind.operator();
        if inputs.len() != operator.num_inputs() || outputs.len() != operator.num_outputs() {
            return Support::malformed(format!(
                "{operator} takes {} inputs and {} outputs, got {} and {}",
                operator.num_inputs(),
                operator.num_outputs(),
                inputs.len(),
                outputs.len()
            ));
        }
        if let Some(slot) = inputs.iter().position(|info| !info.shape().is_specified()) {
            return Support::malformed(format!("input {slot} has an unspecified shape"));
        }
        if let Some(slot) = outputs.iter().position(|info| !info.shape().is_specified()) {
            return Support::malformed(format!("output {slot} has an unspecified shape"));
        }
        match self.entries.get(&operator) {
            Some(entry) => (entry.validate)(kind, inputs, outputs),
            None => Support::unsupported(format!(
                "backend '{}' has no kernel for {operator}",
                self.backend
            )),
        }
    }

    pub fn create(
        &self,
        request: &WorkloadRequest,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>> {
        if !request.is_validated_by(&self.backend) {
            return Err(BackendError::NotValidated {
                layer: request.layer_name().to_owned(),
                backend: self.backend.clone(),
            });
        }
        let entry = self.entries.get(&request.operator()).ok_or_else(|| {
            BackendError::unsupported(
                self.backend.clone(),
                request.operator(),
                "no kernel registered",
            )
        })?;
        check_memory(request.layer_name(), request.info(), &memory)?;
        tracing::debug!(
            backend = %self.backend,
            layer = request.layer_name(),
            operator = %request.operator(),
            "creating workload"
        );
        (entry.create)(request, memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::workload::BaseWorkload;
    use crate::tensor::{DataType, TensorShape};

    struct Noop(BaseWorkload<()>);

    impl Workload for Noop {
        fn name(&self) -> &str {
            &self.0.layer
        }

        fn execute(&self) -> BackendResult<()> {
            Ok(())
        }

        fn execute_async(&self, memory: &WorkingMemDescriptor) -> BackendResult<()> {
            self.0.check(memory)
        }
    }

    fn create_noop(
        request: &WorkloadRequest,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>> {
        let base = BaseWorkload::new(request.layer_name(), (), request.info().clone(), memory)?;
        Ok(Box::new(Noop(base)))
    }

    fn float_only(_: &LayerKind, inputs: &[TensorInfo], _: &[TensorInfo]) -> Support {
        if inputs.iter().all(|info| info.data_type() == DataType::Float32) {
            Support::Supported
        } else {
            Support::unsupported("float only")
        }
    }

    struct TableFactory(KernelTable);

    impl WorkloadFactory for TableFactory {
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

    fn factory(name: &str) -> TableFactory {
        TableFactory(KernelTable::new(name).register(
            OperatorKind::Addition,
            float_only,
            create_noop,
        ))
    }

    fn info(data_type: DataType) -> TensorInfo {
        TensorInfo::new(TensorShape::new(&[2]).unwrap(), data_type)
    }

    fn add_request(data_type: DataType) -> WorkloadRequest {
        WorkloadRequest::new(
            "add",
            LayerKind::Addition,
            WorkloadInfo::new(vec![info(data_type), info(data_type)], vec![info(data_type)]),
        )
    }

    #[test]
    fn create_requires_a_stamp_from_the_same_backend() {
        let first = factory("first");
        let second = factory("second");
        let mut request = add_request(DataType::Float32);
        let memory = WorkingMemDescriptor::allocate(request.info());

        assert!(matches!(
            first.create_workload(&request, memory.clone()),
            Err(BackendError::NotValidated { .. })
        ));
        assert!(request.validate_with(&first).is_supported());
        assert!(matches!(
            second.create_workload(&request, memory.clone()),
            Err(BackendError::NotValidated { .. })
        ));
        let workload = first.create_workload(&request, memory).unwrap();
        assert_eq!(workload.name(), "add");
    }

    #[test]
    fn failed_validation_clears_the_stamp() {
        let backend = factory("only");
        let mut request = add_request(DataType::Float32);
        assert!(request.validate_with(&backend).is_supported());

        let mut quantized = add_request(DataType::QAsymmU8);
        assert_eq!(
            quantized.validate_with(&backend),
            Support::unsupported("float only")
        );
        assert_eq!(quantized.validated_by(), None);
    }

    #[test]
    fn table_checks_arity_and_coverage() {
        let table = factory("t").0;
        let one_input = [info(DataType::Float32)];
        assert!(matches!(
            table.validate(&LayerKind::Addition, &one_input, &one_input),
            Support::Malformed(_)
        ));
        let unspecified = [TensorInfo::default(), info(DataType::Float32)];
        assert!(matches!(
            table.validate(&LayerKind::Addition, &unspecified, &one_input),
            Support::Malformed(_)
        ));
        assert!(matches!(
            table.validate(&LayerKind::Multiplication, &vec![unspecified[1].clone(); 2], &one_input),
            Support::Unsupported(_)
        ));
    }
}
