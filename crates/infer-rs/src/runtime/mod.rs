//! Loading a graph onto backends and running it.

mod error;
mod network;
mod options;

pub use error::{RuntimeError, RuntimeResult};
pub use network::{LoadedNetwork, WorkingMemory};
pub use options::NetworkOptions;
