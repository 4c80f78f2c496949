//! PostgreSQL-based todo store.
//!
//! Each operation maps onto one statement; failures are passed back as
//! [`Error::StoreFailure`] without retry. Identifiers are UUIDs, and a
//! malformed identifier is a store failure rather than "not found".

use crate::models::{NewTodo, Todo, TodoId, TodoPatch};
use crate::storage::connectivity::{ConnectionState, HealthProbe};
use crate::storage::migrations::{Migration, MigrationRunner};
use crate::storage::traits::{StoreKind, TodoStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, PoolError, Runtime};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_postgres::NoTls;
use uuid::Uuid;

/// Embedded migrations compiled into the binary.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial todos table",
        sql: r"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                seq BIGSERIAL NOT NULL,
                text TEXT NOT NULL,
                done BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
        ",
    },
    Migration {
        version: 2,
        description: "Add created_at ordering index",
        sql: r"
            CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table} (created_at DESC, seq DESC);
        ",
    },
];

const COLUMNS: &str = "id, text, done, created_at";

/// PostgreSQL-based todo store.
pub struct PostgresTodoStore {
    /// Connection pool.
    pool: Pool,
    /// Table name for todos.
    table_name: String,
    /// Readiness to downgrade when a connection turns out to be gone.
    state: Option<Arc<ConnectionState>>,
    /// Set once migrations have been applied in this process.
    schema_ready: OnceCell<()>,
}

/// Returns true if `name` is safe to interpolate as a table name.
#[must_use]
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 48
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PostgresTodoStore {
    /// Default maximum connections in pool.
    pub const DEFAULT_POOL_MAX_SIZE: usize = 16;

    /// Creates a new store.
    ///
    /// No connection is opened here; the pool connects lazily, so this
    /// succeeds even while the database is down.
    pub fn new(connection_url: &str, table_name: impl Into<String>) -> Result<Self> {
        Self::with_pool_size(connection_url, table_name, None)
    }

    /// Creates a new store with a configurable pool size.
    ///
    /// # Arguments
    ///
    /// * `connection_url` - PostgreSQL connection URL
    /// * `table_name` - Name of the table holding todos
    /// * `pool_max_size` - Maximum connections in pool (defaults to 16)
    pub fn with_pool_size(
        connection_url: &str,
        table_name: impl Into<String>,
        pool_max_size: Option<usize>,
    ) -> Result<Self> {
        let table_name = table_name.into();
        if !is_valid_table_name(&table_name) {
            return Err(Error::InvalidInput(format!(
                "table name '{table_name}' must be alphanumeric or underscore"
            )));
        }

        let config = Self::parse_connection_url(connection_url)?;
        let cfg = Self::build_pool_config(&config, pool_max_size);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::store("postgres_todo_create_pool", e))?;

        Ok(Self {
            pool,
            table_name,
            state: None,
            schema_ready: OnceCell::new(),
        })
    }

    /// Reports dropped connections to `state`.
    #[must_use]
    pub fn with_connection_state(mut self, state: Arc<ConnectionState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn parse_connection_url(url: &str) -> Result<tokio_postgres::Config> {
        url.parse::<tokio_postgres::Config>()
            .map_err(|e| Error::store("postgres_todo_parse_url", e))
    }

    #[cfg(unix)]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        match h {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
        }
    }

    #[cfg(not(unix))]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        let tokio_postgres::config::Host::Tcp(s) = h;
        s.clone()
    }

    /// Builds a deadpool config from a tokio-postgres config.
    ///
    /// Acquire, connect and recycle are each bounded at 5 seconds so a dead
    /// database surfaces as an error instead of a hung request.
    fn build_pool_config(config: &tokio_postgres::Config, pool_max_size: Option<usize>) -> Config {
        let mut cfg = Config::new();
        cfg.host = config.get_hosts().first().map(Self::host_to_string);
        cfg.port = config.get_ports().first().copied();
        cfg.user = config.get_user().map(String::from);
        cfg.password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = config.get_dbname().map(String::from);

        let max_size = pool_max_size.unwrap_or(Self::DEFAULT_POOL_MAX_SIZE);
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(std::time::Duration::from_secs(5)),
                create: Some(std::time::Duration::from_secs(5)),
                recycle: Some(std::time::Duration::from_secs(5)),
            },
            ..Default::default()
        });

        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        cfg
    }

    /// Applies pending migrations once per process.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                let runner = MigrationRunner::new(self.pool.clone(), &self.table_name);
                runner.run(MIGRATIONS).await
            })
            .await
            .map(|_| ())
    }

    fn mark_disconnected(&self) {
        if let Some(state) = &self.state {
            state.mark_disconnected();
        }
    }

    fn pool_error(&self, op: &str, e: PoolError) -> Error {
        // Failing to get a client means the database could not be reached.
        self.mark_disconnected();
        Error::store(op, e)
    }

    fn query_error(&self, op: &str, e: tokio_postgres::Error) -> Error {
        if e.is_closed() {
            self.mark_disconnected();
        }
        Error::store(op, e)
    }

    fn parse_key(op: &str, id: &str) -> Result<Uuid> {
        Uuid::parse_str(id).map_err(|e| Error::store(op, format!("invalid identifier '{id}': {e}")))
    }

    fn row_to_todo(row: &tokio_postgres::Row) -> Todo {
        let id: Uuid = row.get("id");
        let created_at: DateTime<Utc> = row.get("created_at");

        Todo {
            id: TodoId::Key(id.to_string()),
            text: row.get("text"),
            done: row.get("done"),
            created_at,
        }
    }

    async fn client(&self, op: &str) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| self.pool_error(op, e))
    }
}

#[async_trait]
impl TodoStore for PostgresTodoStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }

    async fn create(&self, new: NewTodo) -> Result<Todo> {
        const OP: &str = "postgres_todo_create";
        let client = self.client(OP).await?;

        let insert = format!(
            "INSERT INTO {} (id, text, done, created_at) VALUES ($1, $2, FALSE, $3) RETURNING {COLUMNS}",
            self.table_name
        );

        let row = client
            .query_one(&insert, &[&Uuid::new_v4(), &new.text, &Utc::now()])
            .await
            .map_err(|e| self.query_error(OP, e))?;

        Ok(Self::row_to_todo(&row))
    }

    async fn list(&self) -> Result<Vec<Todo>> {
        const OP: &str = "postgres_todo_list";
        let client = self.client(OP).await?;

        let query = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY created_at DESC, seq DESC",
            self.table_name
        );

        let rows = client
            .query(&query, &[])
            .await
            .map_err(|e| self.query_error(OP, e))?;

        Ok(rows.iter().map(Self::row_to_todo).collect())
    }

    async fn update(&self, id: &str, patch: TodoPatch) -> Result<Option<Todo>> {
        const OP: &str = "postgres_todo_update";
        let key = Self::parse_key(OP, id)?;
        let client = self.client(OP).await?;

        let update = format!(
            "UPDATE {} SET text = COALESCE($2, text), done = COALESCE($3, done)
             WHERE id = $1 RETURNING {COLUMNS}",
            self.table_name
        );

        let row = client
            .query_opt(&update, &[&key, &patch.text, &patch.done])
            .await
            .map_err(|e| self.query_error(OP, e))?;

        Ok(row.as_ref().map(Self::row_to_todo))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        const OP: &str = "postgres_todo_delete";
        let key = Self::parse_key(OP, id)?;
        let client = self.client(OP).await?;

        let delete = format!("DELETE FROM {} WHERE id = $1 RETURNING id", self.table_name);
        let row = client
            .query_opt(&delete, &[&key])
            .await
            .map_err(|e| self.query_error(OP, e))?;

        Ok(row.is_some())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    async fn count(&self) -> Result<usize> {
        const OP: &str = "postgres_todo_count";
        let client = self.client(OP).await?;

        let query = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let count: i64 = client
            .query_one(&query, &[])
            .await
            .map(|row| row.get(0))
            .map_err(|e| self.query_error(OP, e))?;

        Ok(count as usize)
    }
}

#[async_trait]
impl HealthProbe for PostgresTodoStore {
    async fn probe(&self) -> Result<()> {
        const OP: &str = "postgres_todo_probe";
        let client = self.client(OP).await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| self.query_error(OP, e))?;
        drop(client);

        self.ensure_schema().await
    }
}
