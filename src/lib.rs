//! # Simple CRUD
//!
//! A minimal todo-list backend.
//!
//! Todos are kept in PostgreSQL when the database is reachable and in a
//! process-local store when it is not. A small HTTP API exposes create,
//! list, update and delete, and a static file server hosts the single-page
//! frontend.
//!
//! ## Layers
//!
//! - [`storage`]: the [`TodoStore`] trait, the in-memory and PostgreSQL
//!   implementations, and the connectivity gate that picks between them
//! - [`services`]: [`TodoService`], the dual-mode dispatcher
//! - [`api`]: axum router, handlers and error mapping
//! - [`config`], [`observability`]: ambient configuration and logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use simple_crud::{NewTodo, TodoService};
//!
//! let service = TodoService::memory_only();
//! let todo = service.create(NewTodo::new("buy milk")).await?;
//! assert!(!todo.done);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod api;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{AppConfig, FallbackPolicy};
pub use models::{NewTodo, Todo, TodoId, TodoPatch};
pub use services::{ActiveBackend, TodoService};
pub use storage::{ConnectionState, ConnectivityGate, ManualGate, MemoryTodoStore, TodoStore};

/// Error type for simple-crud operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | Update or delete targets an id the active store does not hold |
/// | `StoreFailure` | The active store could not complete an operation |
/// | `StoreUnavailable` | Fallback is disabled and the database is not connected |
/// | `InvalidInput` | Malformed request bodies |
/// | `OperationFailed` | Startup and infrastructure failures (config, bind, logging) |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The target record does not exist in the active store.
    ///
    /// This is an expected outcome, surfaced to HTTP callers as 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// The active store failed.
    ///
    /// Raised when:
    /// - The connection pool cannot hand out a client (timeout, refused)
    /// - A query fails or the connection drops mid-query
    /// - A persistent identifier is not a valid key
    /// - The in-memory store lock is poisoned
    #[error("store operation '{operation}' failed: {cause}")]
    StoreFailure {
        /// The store operation that failed.
        operation: String,
        /// The underlying cause, passed through verbatim.
        cause: String,
    },

    /// The persistent store is not connected and fallback is disabled.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An infrastructure operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::StoreFailure`] from any displayable cause.
    pub fn store(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::StoreFailure {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Builds an [`Error::OperationFailed`] from any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for simple-crud operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("7".to_string());
        assert_eq!(err.to_string(), "not found: 7");

        let err = Error::store("postgres_todo_update", "connection refused");
        assert_eq!(
            err.to_string(),
            "store operation 'postgres_todo_update' failed: connection refused"
        );

        let err = Error::StoreUnavailable("database not connected".to_string());
        assert_eq!(err.to_string(), "store unavailable: database not connected");

        let err = Error::operation("bind", "address in use");
        assert_eq!(err.to_string(), "operation 'bind' failed: address in use");
    }
}
