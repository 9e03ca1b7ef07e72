mod registry;
mod selectors;

pub use registry::{ModelId, ModelRegistry, ModelSpec};
pub use selectors::{ModelSelection, ModelSelector};
