//! Query execution against each index's shared searcher.

pub mod coordinator;
pub mod page;

pub use coordinator::{SearchCoordinator, SearchMode};
pub use page::{PagedResults, ResultRow, SearchResultHandler, result_window};
