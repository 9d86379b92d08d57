pub mod builtin;
pub mod discover;
pub mod manifest;
pub mod registry;

pub use manifest::PluginId;
pub use registry::{Plugin, PluginContext, PluginRegistry, RegistryError};
