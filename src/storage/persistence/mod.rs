//! Persistence backend implementations.

mod postgresql;

pub use postgresql::{PostgresTodoStore, is_valid_table_name};
