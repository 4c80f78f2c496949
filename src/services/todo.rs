//! Todo service.
//!
//! Routes each call to the persistent store or the in-memory store,
//! depending on what the connectivity gate says at the moment of the call.

use crate::config::FallbackPolicy;
use crate::models::{NewTodo, Todo, TodoPatch};
use crate::storage::{ConnectivityGate, ManualGate, MemoryTodoStore, TodoStore};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// The store that would serve a call made right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBackend {
    /// The database.
    Persistent,
    /// The process-local store.
    Memory,
    /// Neither; the database is down and fallback is disabled.
    Unavailable,
}

impl ActiveBackend {
    /// Returns the backend name as reported by the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Memory => "memory",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ActiveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dual-mode todo service.
///
/// The gate is read once at the start of every operation and that one answer
/// decides which store handles the whole operation. Records are never copied
/// between the stores.
///
/// # Example
///
/// ```rust,ignore
/// use simple_crud::{NewTodo, TodoPatch, TodoService};
///
/// let service = TodoService::memory_only();
/// let todo = service.create(NewTodo::new("buy milk")).await?;
/// let done = service.update(&todo.id.to_string(), TodoPatch::done(true)).await?;
/// assert!(done.done);
/// ```
#[derive(Clone)]
pub struct TodoService {
    gate: Arc<dyn ConnectivityGate>,
    memory: Arc<MemoryTodoStore>,
    persistent: Option<Arc<dyn TodoStore>>,
    fallback: FallbackPolicy,
}

impl fmt::Debug for TodoService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoService")
            .field("gate", &self.gate)
            .field("has_persistent", &self.persistent.is_some())
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl TodoService {
    /// Creates a service over the given stores.
    ///
    /// Without a persistent store the gate is still consulted, but a
    /// connected answer cannot route anywhere and is treated as disconnected.
    #[must_use]
    pub fn new(
        gate: Arc<dyn ConnectivityGate>,
        memory: Arc<MemoryTodoStore>,
        persistent: Option<Arc<dyn TodoStore>>,
        fallback: FallbackPolicy,
    ) -> Self {
        Self {
            gate,
            memory,
            persistent,
            fallback,
        }
    }

    /// Creates a service that only ever uses a fresh in-memory store.
    #[must_use]
    pub fn memory_only() -> Self {
        Self::new(
            Arc::new(ManualGate::new(false)),
            Arc::new(MemoryTodoStore::new()),
            None,
            FallbackPolicy::Memory,
        )
    }

    /// Returns the fallback policy.
    #[must_use]
    pub const fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Returns the in-memory store.
    #[must_use]
    pub fn memory_store(&self) -> &Arc<MemoryTodoStore> {
        &self.memory
    }

    /// Reports which store a call made now would use.
    #[must_use]
    pub fn active_backend(&self) -> ActiveBackend {
        if self.persistent.is_some() && self.gate.is_connected() {
            ActiveBackend::Persistent
        } else if self.fallback == FallbackPolicy::Memory {
            ActiveBackend::Memory
        } else {
            ActiveBackend::Unavailable
        }
    }

    /// Picks the store for one operation.
    fn select(&self) -> Result<(&dyn TodoStore, ActiveBackend)> {
        if self.gate.is_connected()
            && let Some(persistent) = self.persistent.as_deref()
        {
            return Ok((persistent, ActiveBackend::Persistent));
        }

        match self.fallback {
            FallbackPolicy::Memory => Ok((self.memory.as_ref(), ActiveBackend::Memory)),
            FallbackPolicy::Disabled => Err(Error::StoreUnavailable(
                "database is not connected and in-memory fallback is disabled".to_string(),
            )),
        }
    }

    /// Creates a todo with `done = false` and the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreFailure`] if the active store fails, or
    /// [`Error::StoreUnavailable`] if no store may serve the call.
    #[instrument(skip(self, new), fields(operation = "todo.create", backend = tracing::field::Empty))]
    pub async fn create(&self, new: NewTodo) -> Result<Todo> {
        self.run("create", |store| store.create(new)).await
    }

    /// Lists all todos, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreFailure`] if the active store fails, or
    /// [`Error::StoreUnavailable`] if no store may serve the call.
    #[instrument(skip(self), fields(operation = "todo.list", backend = tracing::field::Empty))]
    pub async fn list(&self) -> Result<Vec<Todo>> {
        self.run("list", |store| store.list()).await
    }

    /// Applies `patch` to the todo with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the active store holds no such id,
    /// [`Error::StoreFailure`] if it fails, or [`Error::StoreUnavailable`]
    /// if no store may serve the call.
    #[instrument(skip(self, patch), fields(operation = "todo.update", backend = tracing::field::Empty))]
    pub async fn update(&self, id: &str, patch: TodoPatch) -> Result<Todo> {
        let updated = self
            .run("update", |store| store.update(id, patch))
            .await?;
        updated.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Deletes the todo with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the active store holds no such id,
    /// [`Error::StoreFailure`] if it fails, or [`Error::StoreUnavailable`]
    /// if no store may serve the call.
    #[instrument(skip(self), fields(operation = "todo.delete", backend = tracing::field::Empty))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let deleted = self
            .run("delete", |store| store.delete(id))
            .await?;
        if deleted {
            Ok(())
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }

    /// Selects a store once, runs `op` against it and records the outcome.
    async fn run<'a, T, F, Fut>(&'a self, operation: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(&'a dyn TodoStore) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();

        let (store, backend) = match self.select() {
            Ok(selected) => selected,
            Err(e) => {
                record(operation, ActiveBackend::Unavailable, "unavailable", start);
                tracing::warn!(operation, error = %e, "Rejected todo operation");
                return Err(e);
            },
        };
        tracing::Span::current().record("backend", backend.as_str());
        tracing::debug!(operation, backend = %backend, "Dispatching todo operation");

        let result = op(store).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => {
                tracing::warn!(operation, backend = %backend, error = %e, "Todo operation failed");
                "error"
            },
        };
        record(operation, backend, status, start);

        result
    }
}

fn record(operation: &'static str, backend: ActiveBackend, status: &'static str, start: Instant) {
    metrics::counter!(
        "todo_operations_total",
        "operation" => operation,
        "backend" => backend.as_str(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "todo_operation_duration_ms",
        "operation" => operation,
        "backend" => backend.as_str()
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TodoId;
    use crate::storage::StoreKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that counts calls and fails on demand.
    #[derive(Default)]
    struct RecordingStore {
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn check(&self, op: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::store(op, "connection reset by peer"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TodoStore for RecordingStore {
        fn kind(&self) -> StoreKind {
            StoreKind::Persistent
        }

        async fn create(&self, new: NewTodo) -> Result<Todo> {
            self.check("recording_create")?;
            Ok(Todo {
                id: TodoId::Key("aaaaaaaa-0000-0000-0000-000000000001".to_string()),
                text: new.text,
                done: false,
                created_at: chrono::Utc::now(),
            })
        }

        async fn list(&self) -> Result<Vec<Todo>> {
            self.check("recording_list")?;
            Ok(Vec::new())
        }

        async fn update(&self, _id: &str, _patch: TodoPatch) -> Result<Option<Todo>> {
            self.check("recording_update")?;
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> Result<bool> {
            self.check("recording_delete")?;
            Ok(false)
        }
    }

    fn service_with(
        gate: &Arc<ManualGate>,
        persistent: Arc<RecordingStore>,
        fallback: FallbackPolicy,
    ) -> TodoService {
        TodoService::new(
            Arc::clone(gate) as Arc<dyn ConnectivityGate>,
            Arc::new(MemoryTodoStore::new()),
            Some(persistent as Arc<dyn TodoStore>),
            fallback,
        )
    }

    #[test]
    fn test_active_backend() {
        let gate = Arc::new(ManualGate::new(true));
        let service = service_with(&gate, Arc::default(), FallbackPolicy::Memory);
        assert_eq!(service.active_backend(), ActiveBackend::Persistent);

        gate.set_connected(false);
        assert_eq!(service.active_backend(), ActiveBackend::Memory);

        let strict = service_with(&gate, Arc::default(), FallbackPolicy::Disabled);
        assert_eq!(strict.active_backend(), ActiveBackend::Unavailable);
    }

    #[test]
    fn test_connected_gate_without_persistent_store_uses_memory() {
        let service = TodoService::new(
            Arc::new(ManualGate::new(true)),
            Arc::new(MemoryTodoStore::new()),
            None,
            FallbackPolicy::Memory,
        );
        assert_eq!(service.active_backend(), ActiveBackend::Memory);
    }

    #[tokio::test]
    async fn test_memory_only_crud() {
        let service = TodoService::memory_only();

        let todo = service.create(NewTodo::new("buy milk")).await.unwrap();
        assert_eq!(todo.id, TodoId::Seq(1));

        let updated = service.update("1", TodoPatch::done(true)).await.unwrap();
        assert!(updated.done);

        service.delete("1").await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let service = TodoService::memory_only();

        let err = service.update("99", TodoPatch::done(true)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref id) if id == "99"));

        let err = service.delete("abc").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_routes_to_persistent_when_connected() {
        let gate = Arc::new(ManualGate::new(true));
        let persistent = Arc::new(RecordingStore::default());
        let service = service_with(&gate, Arc::clone(&persistent), FallbackPolicy::Memory);

        let todo = service.create(NewTodo::new("buy milk")).await.unwrap();

        assert!(matches!(todo.id, TodoId::Key(_)));
        assert_eq!(persistent.calls.load(Ordering::SeqCst), 1);
        assert!(service.memory_store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_persistent_not_found_maps_to_not_found() {
        let gate = Arc::new(ManualGate::new(true));
        let service = service_with(&gate, Arc::default(), FallbackPolicy::Memory);

        assert!(matches!(
            service.update("x", TodoPatch::done(true)).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(service.delete("x").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_retried_elsewhere() {
        let gate = Arc::new(ManualGate::new(true));
        let persistent = Arc::new(RecordingStore::failing());
        let service = service_with(&gate, Arc::clone(&persistent), FallbackPolicy::Memory);

        let err = service.create(NewTodo::new("buy milk")).await.unwrap_err();

        assert!(matches!(err, Error::StoreFailure { ref cause, .. } if cause.contains("reset")));
        assert_eq!(persistent.calls.load(Ordering::SeqCst), 1);
        assert!(service.memory_store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_disabled_fallback_rejects_without_touching_stores() {
        let gate = Arc::new(ManualGate::new(false));
        let persistent = Arc::new(RecordingStore::default());
        let service = service_with(&gate, Arc::clone(&persistent), FallbackPolicy::Disabled);

        let err = service.list().await.unwrap_err();

        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(persistent.calls.load(Ordering::SeqCst), 0);
        assert!(service.memory_store().is_empty().unwrap());
    }
}
