//! In-memory todo store.
//!
//! Backs the API whenever the database is not connected. Records live only
//! as long as the process; they are never copied to or from the database.

use crate::models::{NewTodo, Todo, TodoId, TodoPatch};
use crate::storage::traits::{StoreKind, TodoStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Records plus the id counter. Kept under one lock so that issuing an id
/// and appending the record happen as a unit.
#[derive(Debug)]
struct MemoryState {
    records: Vec<Todo>,
    next_id: u64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
            last_created_at: None,
        }
    }
}

/// In-memory todo store.
///
/// Ids are sequential integers starting at 1. Lookups convert the caller's
/// identifier to an integer; anything that is not a base-10 `u64` matches no
/// record.
///
/// # Example
///
/// ```rust
/// use simple_crud::MemoryTodoStore;
///
/// let store = MemoryTodoStore::new();
/// let first = store.insert("buy milk").unwrap();
/// assert_eq!(first.id.as_seq(), Some(1));
/// assert!(store.remove("1").unwrap());
/// assert!(!store.remove("1").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct MemoryTodoStore {
    state: Mutex<MemoryState>,
}

impl MemoryTodoStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a caller-supplied identifier into this store's id space.
    #[must_use]
    pub fn parse_id(raw: &str) -> Option<u64> {
        raw.parse::<u64>().ok()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| Error::store("memory_todo_lock", e))
    }

    /// Appends a new record.
    ///
    /// Timestamps never go backwards within one store, so a clock step does
    /// not reorder earlier records.
    pub fn insert(&self, text: impl Into<String>) -> Result<Todo> {
        self.insert_at(text, Utc::now())
    }

    fn insert_at(&self, text: impl Into<String>, now: DateTime<Utc>) -> Result<Todo> {
        let mut state = self.lock()?;

        let created_at = match state.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };

        let todo = Todo {
            id: TodoId::Seq(state.next_id),
            text: text.into(),
            done: false,
            created_at,
        };
        state.next_id += 1;
        state.last_created_at = Some(created_at);
        state.records.push(todo.clone());

        Ok(todo)
    }

    /// Returns every record, newest first.
    ///
    /// Records with equal timestamps are ordered by insertion, later first.
    pub fn snapshot(&self) -> Result<Vec<Todo>> {
        let state = self.lock()?;
        let mut todos: Vec<Todo> = state.records.iter().rev().cloned().collect();
        drop(state);

        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(todos)
    }

    /// Shallow-merges `patch` onto the record with the given id.
    pub fn patch(&self, id: &str, patch: &TodoPatch) -> Result<Option<Todo>> {
        let Some(seq) = Self::parse_id(id) else {
            return Ok(None);
        };

        let mut state = self.lock()?;
        let Some(todo) = state
            .records
            .iter_mut()
            .find(|todo| todo.id.as_seq() == Some(seq))
        else {
            return Ok(None);
        };

        patch.apply(todo);
        Ok(Some(todo.clone()))
    }

    /// Removes the record with the given id.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let Some(seq) = Self::parse_id(id) else {
            return Ok(false);
        };

        let mut state = self.lock()?;
        let Some(position) = state
            .records
            .iter()
            .position(|todo| todo.id.as_seq() == Some(seq))
        else {
            return Ok(false);
        };

        state.records.remove(position);
        Ok(true)
    }

    /// Returns the number of records stored.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.records.len())
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.records.is_empty())
    }

    /// Drops every record. The id counter keeps counting.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.records.clear();
        Ok(())
    }
}

#[async_trait]
impl TodoStore for MemoryTodoStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn create(&self, new: NewTodo) -> Result<Todo> {
        self.insert(new.text)
    }

    async fn list(&self) -> Result<Vec<Todo>> {
        self.snapshot()
    }

    async fn update(&self, id: &str, patch: TodoPatch) -> Result<Option<Todo>> {
        self.patch(id, &patch)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.remove(id)
    }

    async fn count(&self) -> Result<usize> {
        self.len()
    }
}
