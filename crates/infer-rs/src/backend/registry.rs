//! Runtime backend registry for selecting workload factories by name.
//!
//! Backend crates register a constructor under a stable name, typically from a load-time
//! initializer, and the runtime looks factories up from its preference list.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use super::factory::WorkloadFactory;

/// Factory function that creates a new workload factory instance.
pub type FactoryConstructor = Box<dyn Fn() -> Box<dyn WorkloadFactory> + Send + Sync>;

/// Global backend registry mapping backend names to constructors.
struct BackendRegistry {
    backends: RwLock<HashMap<String, FactoryConstructor>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: FactoryConstructor) {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Box<dyn WorkloadFactory>> {
        let registry = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_backend(&self, name: &str) -> bool {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

fn global_registry() -> &'static BackendRegistry {
    GLOBAL_REGISTRY.get_or_init(BackendRegistry::new)
}

/// Register a backend by name. Re-registering a name replaces its constructor.
///
/// # Example
/// ```ignore
/// use infer_rs::backend::registry::register_backend;
///
/// pub fn register() {
///     register_backend("my-backend", || Box::new(MyWorkloadFactory::new()));
/// }
/// ```
pub fn register_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Box<dyn WorkloadFactory> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Create a factory by name, or `None` if nothing is registered under it.
pub fn create_factory(name: &str) -> Option<Box<dyn WorkloadFactory>> {
    global_registry().create(name)
}

/// Registered backend names, sorted.
pub fn list_backends() -> Vec<String> {
    global_registry().list_backends()
}

pub fn has_backend(name: &str) -> bool {
    global_registry().has_backend(name)
}
