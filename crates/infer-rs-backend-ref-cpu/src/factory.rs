use infer_rs::backend::{
    BackendResult, KernelTable, Support, WorkingMemDescriptor, Workload, WorkloadFactory,
    WorkloadRequest,
};
use infer_rs::graph::{LayerKind, OperatorKind};
use infer_rs::tensor::TensorInfo;

use crate::workloads;

pub const BACKEND_ID: &str = "cpu-ref";

/// Portable backend covering every compute operator with plain `f32` loops.
#[derive(Clone)]
pub struct RefWorkloadFactory {
    table: KernelTable,
}

impl Default for RefWorkloadFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RefWorkloadFactory {
    pub fn new() -> Self {
        let table = KernelTable::new(BACKEND_ID)
            .register(
                OperatorKind::Addition,
                workloads::validate_elementwise,
                workloads::create_addition,
            )
            .register(
                OperatorKind::Multiplication,
                workloads::validate_elementwise,
                workloads::create_multiplication,
            )
            .register(
                OperatorKind::FullyConnected,
                workloads::validate_fully_connected,
                workloads::create_fully_connected,
            )
            .register(
                OperatorKind::Pooling2d,
                workloads::validate_pooling2d,
                workloads::create_pooling2d,
            )
            .register(
                OperatorKind::L2Normalization,
                workloads::validate_l2_normalization,
                workloads::create_l2_normalization,
            )
            .register(
                OperatorKind::Slice,
                workloads::validate_slice,
                workloads::create_slice,
            )
            .register(
                OperatorKind::GatherNd,
                workloads::validate_gather_nd,
                workloads::create_gather_nd,
            );
        Self { table }
    }

    pub fn create() -> Box<dyn WorkloadFactory> {
        Box::new(Self::new())
    }

    pub fn kernels(&self) -> &KernelTable {
        &self.table
    }
}

impl WorkloadFactory for RefWorkloadFactory {
    fn backend_id(&self) -> &str {
        self.table.backend()
    }

    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Support {
        self.table.validate(kind, inputs, outputs)
    }

    fn create_workload(
        &self,
        request: &WorkloadRequest,
        memory: WorkingMemDescriptor,
    ) -> BackendResult<Box<dyn Workload>> {
        self.table.create(request, memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_compute_operator() {
        let factory = RefWorkloadFactory::new();
        let covered: Vec<_> = factory.kernels().operators().collect();
        let compute: Vec<_> = OperatorKind::ALL
            .iter()
            .copied()
            .filter(|op| !op.is_boundary())
            .collect();
        assert_eq!(covered, compute);
    }
}
