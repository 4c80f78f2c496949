//! Backend factory for storage layer initialization.
//!
//! # Architecture
//!
//! ```text
//! BackendFactory
//!   ├── create_memory_store()     → Arc<MemoryTodoStore>
//!   ├── create_persistent_store() → Option<Arc<PostgresTodoStore>>
//!   └── create_all()              → BackendSet
//!
//! BackendSet
//!   ├── connect()        first probe, bounded by a timeout
//!   ├── spawn_monitor()  periodic probes until shutdown
//!   └── service()        TodoService wired to the shared state
//! ```
//!
//! # Graceful Degradation
//!
//! A persistent store that cannot be constructed (bad URL, bad table name)
//! is logged and left out. The service then runs on the in-memory store
//! alone, or rejects calls if fallback is disabled.

use crate::config::{AppConfig, FallbackPolicy};
use crate::services::TodoService;
use crate::storage::{
    ConnectionMonitor, ConnectionMonitorConfig, ConnectionState, ConnectivityGate, HealthProbe,
    MemoryTodoStore, PostgresTodoStore, TodoStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Upper bound on the startup connection attempt.
pub const INITIAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of backend initialization.
pub struct BackendSet {
    /// Process-local store.
    pub memory: Arc<MemoryTodoStore>,
    /// Database store, if one could be constructed.
    pub persistent: Option<Arc<PostgresTodoStore>>,
    /// Shared readiness, updated by the monitor and by the database store.
    pub state: Arc<ConnectionState>,
    /// Probe cadence.
    pub monitor: ConnectionMonitorConfig,
    /// Behaviour while disconnected.
    pub fallback: FallbackPolicy,
}

impl BackendSet {
    /// Returns true if a database store is configured.
    #[must_use]
    pub const fn has_persistent(&self) -> bool {
        self.persistent.is_some()
    }

    /// Attempts the first connection.
    ///
    /// Returns true if the database answered within `timeout`. Failure is
    /// not an error: the monitor keeps retrying.
    pub async fn connect(&self, timeout: Duration) -> bool {
        let Some(store) = &self.persistent else {
            return false;
        };

        match tokio::time::timeout(
            timeout,
            ConnectionMonitor::check_once(store.as_ref(), &self.state),
        )
        .await
        {
            Ok(connected) => connected,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Initial database connection timed out"
                );
                false
            },
        }
    }

    /// Starts the background probe loop.
    ///
    /// Returns `None` when there is no database to watch.
    #[must_use]
    pub fn spawn_monitor(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let store = self.persistent.as_ref()?;
        let probe: Arc<dyn HealthProbe> = Arc::clone(store) as Arc<dyn HealthProbe>;

        Some(ConnectionMonitor::spawn(
            probe,
            Arc::clone(&self.state),
            self.monitor.clone(),
            shutdown,
        ))
    }

    /// Builds the todo service over these backends.
    #[must_use]
    pub fn service(&self) -> TodoService {
        TodoService::new(
            Arc::clone(&self.state) as Arc<dyn ConnectivityGate>,
            Arc::clone(&self.memory),
            self.persistent
                .as_ref()
                .map(|store| Arc::clone(store) as Arc<dyn TodoStore>),
            self.fallback,
        )
    }
}

/// Factory for creating storage backends.
///
/// # Example
///
/// ```rust,ignore
/// use simple_crud::AppConfig;
/// use simple_crud::services::BackendFactory;
///
/// let backends = BackendFactory::create_all(&AppConfig::default());
/// backends.connect(std::time::Duration::from_secs(2)).await;
/// let service = backends.service();
/// ```
pub struct BackendFactory;

impl BackendFactory {
    /// Creates all backends from configuration.
    #[must_use]
    pub fn create_all(config: &AppConfig) -> BackendSet {
        let state = Arc::new(ConnectionState::new());
        let persistent = Self::create_persistent_store(config, &state);

        BackendSet {
            memory: Self::create_memory_store(),
            persistent,
            state,
            monitor: ConnectionMonitorConfig::default()
                .with_interval(config.health_check_interval),
            fallback: config.fallback,
        }
    }

    /// Creates the in-memory store.
    #[must_use]
    pub fn create_memory_store() -> Arc<MemoryTodoStore> {
        Arc::new(MemoryTodoStore::new())
    }

    /// Creates the PostgreSQL store.
    ///
    /// # Returns
    ///
    /// `Some(store)` on success, `None` if the URL or table name is invalid.
    /// No connection is made here.
    pub fn create_persistent_store(
        config: &AppConfig,
        state: &Arc<ConnectionState>,
    ) -> Option<Arc<PostgresTodoStore>> {
        match PostgresTodoStore::with_pool_size(
            &config.database_url,
            config.table_name.as_str(),
            Some(config.pool_max_size),
        ) {
            Ok(store) => {
                tracing::debug!(
                    table = %config.table_name,
                    pool_max_size = config.pool_max_size,
                    "Created PostgreSQL todo store"
                );
                Some(Arc::new(store.with_connection_state(Arc::clone(state))))
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to create PostgreSQL todo store, continuing without database"
                );
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ActiveBackend;

    #[test]
    fn test_invalid_url_degrades_to_memory() {
        let config = AppConfig::default().with_database_url("postgresql://host:notaport/db");
        let backends = BackendFactory::create_all(&config);

        assert!(!backends.has_persistent());
        assert_eq!(backends.service().active_backend(), ActiveBackend::Memory);
    }

    #[test]
    fn test_invalid_table_degrades_to_memory() {
        let mut config = AppConfig::default();
        config.table_name = "todos; DROP TABLE users".to_string();

        assert!(!BackendFactory::create_all(&config).has_persistent());
    }

    #[tokio::test]
    async fn test_valid_url_starts_disconnected() {
        let backends = BackendFactory::create_all(&AppConfig::default());

        assert!(backends.has_persistent());
        assert!(!backends.state.is_connected());
        assert_eq!(backends.service().active_backend(), ActiveBackend::Memory);
    }

    #[tokio::test]
    async fn test_connect_without_database_returns_false() {
        let config = AppConfig::default().with_database_url("postgresql://user@127.0.0.1:1/none");
        let backends = BackendFactory::create_all(&config);

        assert!(!backends.connect(Duration::from_secs(10)).await);
        assert!(!backends.state.is_connected());
    }

    #[tokio::test]
    async fn test_no_monitor_without_persistent_store() {
        let config = AppConfig::default().with_database_url("postgresql://host:notaport/db");
        let backends = BackendFactory::create_all(&config);
        let (_tx, rx) = watch::channel(false);

        assert!(backends.spawn_monitor(rx).is_none());
        assert!(!backends.connect(Duration::from_millis(10)).await);
    }

    #[test]
    fn test_fallback_policy_is_carried() {
        let config = AppConfig::default()
            .with_database_url("postgresql://host:notaport/db")
            .with_fallback(FallbackPolicy::Disabled);
        let service = BackendFactory::create_all(&config).service();

        assert_eq!(service.active_backend(), ActiveBackend::Unavailable);
    }
}
