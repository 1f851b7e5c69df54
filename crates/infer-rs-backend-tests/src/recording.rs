use std::sync::{Arc, Mutex, PoisonError};

use infer_rs::backend::{
    BackendError, BackendResult, BaseWorkload, Support, WorkingMemDescriptor, Workload,
    WorkloadFactory, WorkloadRequest,
};
use infer_rs::graph::{LayerKind, OperatorKind};
use infer_rs::tensor::TensorInfo;

/// One call observed by a [`RecordingFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryCall {
    Validate(OperatorKind),
    Create { layer: String, operator: OperatorKind },
}

pub type CallLog = Arc<Mutex<Vec<FactoryCall>>>;

/// Test double that records validate and create calls in order.
///
/// Wrapping another factory keeps its backend id and forwards every call. The standalone
/// form accepts every compute layer and builds workloads that do nothing.
pub struct RecordingFactory {
    id: String,
    inner: Option<Box<dyn WorkloadFactory>>,
    calls: CallLog,
}

impl Default for RecordingFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self {
            id: "recording".to_string(),
            inner: None,
            calls: CallLog::default(),
        }
    }

    pub fn wrapping(inner: Box<dyn WorkloadFactory>) -> Self {
        Self {
            id: inner.backend_id().to_owned(),
            inner: Some(inner),
            calls: CallLog::default(),
        }
    }

    /// Shared handle to the log; stays readable after the factory moves into a network.
    pub fn log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> Vec<FactoryCall> {
        snapshot(&self.calls)
    }

    fn record(&self, call: FactoryCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

pub fn snapshot(log: &CallLog) -> Vec<FactoryCall> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

impl WorkloadFactory for RecordingFactory {
    fn backend_id(&self) -> &str {
        &self.id
    }

    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Support {
        self.record(FactoryCall::Validate(kind.operator()));
        match &self.inner {
            Some(inner) => inner.is_layer_supported(kind, inputs, outputs),
            None if kind.operator().is_boundary() => {
                Support::unsupported("boundary layers have no workload")
            }
            None => Support::Supported,
        }
    }

    fn create_workload(
        &self,
        request: &WorkloadRequest,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>> {
        self.record(FactoryCall::Create {
            layer: request.layer_name().to_owned(),
            operator: request.operator(),
        });
        if let Some(inner) = &self.inner {
            return inner.create_workload(request, memory);
        }
        if !request.is_validated_by(&self.id) {
            return Err(BackendError::NotValidated {
                layer: request.layer_name().to_owned(),
                backend: self.id.clone(),
            });
        }
        let base = BaseWorkload::new(request.layer_name(), (), request.info().clone(), memory)?;
        Ok(Box::new(NoopWorkload(base)))
    }
}

struct NoopWorkload(BaseWorkload<()>);

impl Workload for NoopWorkload {
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
