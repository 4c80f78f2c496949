//! Storage layer abstraction.
//!
//! Two interchangeable backends implement [`TodoStore`]:
//! - **Memory**: process-local, lost on restart ([`MemoryTodoStore`])
//! - **Persistence**: PostgreSQL over a connection pool ([`PostgresTodoStore`])
//!
//! A [`ConnectivityGate`] tells the service layer which one is usable right now.

// Allow significant_drop_tightening - lock guards are scoped tightly already.
#![allow(clippy::significant_drop_tightening)]

pub mod connectivity;
pub mod memory;
pub mod migrations;
pub mod persistence;
pub mod traits;

pub use connectivity::{
    ConnectionMonitor, ConnectionMonitorConfig, ConnectionState, ConnectivityGate, HealthProbe,
    ManualGate, ReadyState,
};
pub use memory::MemoryTodoStore;
pub use persistence::PostgresTodoStore;
pub use traits::{StoreKind, TodoStore};
