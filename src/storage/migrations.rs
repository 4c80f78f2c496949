//! Schema migrations for the todo table.
//!
//! Each table gets a `<table>_schema_migrations` ledger. Migrations newer
//! than the highest recorded version are applied in version order, each in
//! its own transaction together with its ledger row.

use crate::{Error, Result};
use deadpool_postgres::{Object, Pool};

/// One schema step. `{table}` in `sql` is replaced by the table name.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version, starting at 1.
    pub version: i32,
    /// Recorded in the ledger.
    pub description: &'static str,
    /// Semicolon-separated statements.
    pub sql: &'static str,
}

/// Applies [`Migration`]s to one table.
pub struct MigrationRunner {
    pool: Pool,
    table_name: String,
}

impl MigrationRunner {
    /// Creates a runner for `table_name`.
    #[must_use]
    pub fn new(pool: Pool, table_name: impl Into<String>) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
        }
    }

    /// Brings the table up to the newest version in `migrations`.
    pub async fn run(&self, migrations: &[Migration]) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| Error::store("migration_get_connection", e))?;

        self.ensure_migrations_table(&client).await?;
        let applied = self.get_current_version(&client).await?;

        for migration in pending(migrations, applied) {
            self.apply_migration(&mut client, migration).await?;
        }

        Ok(())
    }

    fn ledger(&self) -> String {
        format!("{}_schema_migrations", self.table_name)
    }

    async fn ensure_migrations_table(&self, client: &Object) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            self.ledger()
        );

        client
            .execute(&sql, &[])
            .await
            .map_err(|e| Error::store("create_migrations_table", e))?;
        Ok(())
    }

    async fn get_current_version(&self, client: &Object) -> Result<i32> {
        let sql = format!("SELECT COALESCE(MAX(version), 0) FROM {}", self.ledger());

        client
            .query_one(&sql, &[])
            .await
            .map(|row| row.get(0))
            .map_err(|e| Error::store("migration_current_version", e))
    }

    async fn apply_migration(&self, client: &mut Object, migration: &Migration) -> Result<()> {
        let step = format!("migration_v{}", migration.version);
        let tx = client
            .transaction()
            .await
            .map_err(|e| Error::store(&step, e))?;

        for statement in statements(migration.sql, &self.table_name) {
            tx.execute(statement.as_str(), &[])
                .await
                .map_err(|e| Error::store(&format!("{step}: {}", migration.description), e))?;
        }

        let record = format!(
            "INSERT INTO {} (version, description) VALUES ($1, $2)",
            self.ledger()
        );
        tx.execute(&record, &[&migration.version, &migration.description])
            .await
            .map_err(|e| Error::store("record_migration", e))?;
        tx.commit().await.map_err(|e| Error::store(&step, e))?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            table = %self.table_name,
            "Applied migration"
        );
        Ok(())
    }
}

/// Migrations newer than `applied`, lowest version first.
fn pending(migrations: &[Migration], applied: i32) -> Vec<&Migration> {
    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|migration| migration.version > applied)
        .collect();
    pending.sort_by_key(|migration| migration.version);
    pending
}

/// Splits `sql` into non-empty statements with `{table}` filled in.
fn statements(sql: &str, table: &str) -> Vec<String> {
    sql.replace("{table}", table)
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_owned)
        .collect()
}
