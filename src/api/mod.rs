//! This mod is meant to hold most of the code for the library's client-facing API.
mod node;
mod options;
mod registry;
mod wiring;

pub use node::SyncNode;
pub use options::SyncOptions;
pub use registry::RegistryError;
pub use registry::Rid;
pub use registry::SyncRegistry;
pub use wiring::OpenError;
pub use wiring::SyncNodeConfig;
