//! Todo records and their request payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a todo record.
///
/// The shape depends on the store that issued it: the in-memory store hands
/// out sequential integers, the database store hands out opaque keys.
/// Serialized as a bare JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TodoId {
    /// Sequential id issued by the in-memory store.
    Seq(u64),
    /// Opaque key issued by the database store.
    Key(String),
}

impl TodoId {
    /// Returns the sequential value, if this is an in-memory id.
    #[must_use]
    pub const fn as_seq(&self) -> Option<u64> {
        match self {
            Self::Seq(n) => Some(*n),
            Self::Key(_) => None,
        }
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(n) => write!(f, "{n}"),
            Self::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<u64> for TodoId {
    fn from(n: u64) -> Self {
        Self::Seq(n)
    }
}

impl From<String> for TodoId {
    fn from(s: String) -> Self {
        Self::Key(s)
    }
}

/// A todo record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique within the issuing store.
    pub id: TodoId,
    /// Free-form content.
    pub text: String,
    /// Completion flag.
    pub done: bool,
    /// Creation time. Never changes after creation.
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    /// Content of the new todo.
    pub text: String,
}

impl NewTodo {
    /// Creates a new payload.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Partial update of a todo.
///
/// Only the fields that are present are written; everything else on the
/// record is left alone. `id` and `createdAt` are not patchable, and unknown
/// fields in the JSON body are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoPatch {
    /// Replacement text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Replacement completion flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl TodoPatch {
    /// A patch that only sets `done`.
    #[must_use]
    pub const fn done(done: bool) -> Self {
        Self {
            text: None,
            done: Some(done),
        }
    }

    /// A patch that only sets `text`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            done: None,
        }
    }

    /// Returns true if the patch carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none() && self.done.is_none()
    }

    /// Shallow-merges the patch onto `todo`.
    pub fn apply(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text.clone_from(text);
        }
        if let Some(done) = self.done {
            todo.done = done;
        }
    }
}
