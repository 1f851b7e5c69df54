//! Accelerated backend: dense kernels run through faer, slicing goes through the native
//! tensor boundary in [`native`].

use faer::Par;
use infer_rs::backend::{
    BackendResult, KernelTable, Support, WorkingMemDescriptor, Workload, WorkloadFactory,
    WorkloadRequest,
};
use infer_rs::graph::{LayerKind, OperatorKind};
use infer_rs::tensor::TensorInfo;

pub mod native;
pub mod workloads;

pub const BACKEND_ID: &str = "faer";

fn faer_parallelism() -> Par {
    let par = faer::get_global_parallelism();
    if par.degree() == 1 {
        Par::Seq
    } else {
        par
    }
}

/// Backend covering elementwise arithmetic, fully connected layers and slicing.
///
/// Everything else is left to backends later in the preference list.
#[derive(Clone)]
pub struct FaerWorkloadFactory {
    table: KernelTable,
}

impl Default for FaerWorkloadFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FaerWorkloadFactory {
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
                OperatorKind::Slice,
                workloads::validate_slice,
                workloads::create_slice,
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

impl WorkloadFactory for FaerWorkloadFactory {
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

/// Register the faer backend with the global backend registry under `"faer"`.
///
/// Called from a static initializer; calling it again replaces the entry with an identical one.
pub fn register_faer_backend() {
    infer_rs::backend::registry::register_backend(BACKEND_ID, FaerWorkloadFactory::create);
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_FAER_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_faer_backend();
    }
    register
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooling_is_left_to_other_backends() {
        let factory = FaerWorkloadFactory::new();
        let covered: Vec<_> = factory.kernels().operators().collect();
        assert!(covered.contains(&OperatorKind::FullyConnected));
        assert!(!covered.contains(&OperatorKind::Pooling2d));
        assert!(!covered.contains(&OperatorKind::GatherNd));
    }
}
