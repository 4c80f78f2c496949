//! Business logic services.
//!
//! Services orchestrate storage backends and provide high-level operations.

mod backend_factory;
mod todo;

pub use backend_factory::{BackendFactory, BackendSet, INITIAL_CONNECT_TIMEOUT};
pub use todo::{ActiveBackend, TodoService};
