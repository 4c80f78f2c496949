//! Data models for simple-crud.

mod todo;

pub use todo::{NewTodo, Todo, TodoId, TodoPatch};
