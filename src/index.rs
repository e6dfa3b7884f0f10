//! Per-index state and the registry that owns it.

pub mod handle;
pub mod registry;

pub use handle::IndexHandle;
pub use registry::IndexRegistry;
