//! Shared reader caching and deferred reader reclamation.

pub mod counter;
pub mod lifecycle;

pub use counter::{ReaderCounter, ReaderGuard};
pub use lifecycle::{ReaderLease, ReaderLifecycleManager};
