mod factory;
pub mod workloads;

pub use factory::{RefWorkloadFactory, BACKEND_ID};
pub use workloads::{Kernel, KernelWorkload};

/// Adds `"cpu-ref"` to the global registry. Also runs from a load-time initializer.
pub fn register_ref_backend() {
    infer_rs::backend::registry::register_backend(BACKEND_ID, RefWorkloadFactory::create);
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_REF_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_ref_backend();
    }
    register
};
