//! Todo store trait.

use crate::Result;
use crate::models::{NewTodo, Todo, TodoPatch};
use async_trait::async_trait;
use std::fmt;

/// Which kind of medium a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Process-local memory.
    Memory,
    /// External database.
    Persistent,
}

impl StoreKind {
    /// Returns the label used in logs, metrics and the health payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Persistent => "persistent",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for todo storage backends.
///
/// Identifiers arrive as the raw strings callers supplied; each backend
/// interprets them in its own id space. Missing records are reported as
/// `Ok(None)` / `Ok(false)`, never as errors, so callers can tell "absent"
/// apart from "the store failed".
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Returns the kind of medium this store writes to.
    fn kind(&self) -> StoreKind;

    /// Stores a new todo and returns it with its assigned id and timestamp.
    async fn create(&self, new: NewTodo) -> Result<Todo>;

    /// Lists all todos, newest first.
    async fn list(&self) -> Result<Vec<Todo>>;

    /// Applies `patch` to the todo with the given id.
    ///
    /// Returns the updated record, or `None` if no such todo exists.
    async fn update(&self, id: &str, patch: TodoPatch) -> Result<Option<Todo>>;

    /// Deletes the todo with the given id.
    ///
    /// Returns `true` if a record was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Returns the total count of todos.
    async fn count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }
}
