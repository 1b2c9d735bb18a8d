use anyhow::Result;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{AppError, AppResult};

const SYSTEM_MIGRATIONS: &[(&str, &str)] = &[(
    "system/000_migrations_table.sql",
    include_str!("migrations/system/000_migrations_table.sql"),
)];

pub struct Database {
    // Kept alive for the lifetime of the connection.
    _db: libsql::Database,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let db = Builder::new_local(&path).build().await?;
        Self::setup(db).await
    }

    #[cfg(test)]
    pub(crate) async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::setup(db).await
    }

    async fn setup(db: libsql::Database) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::catalog::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::account::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::ledger::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::appointment::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::comment::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            write_lock: Mutex::new(()),
        })
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Takes the process-wide write lock and opens a transaction. Callers
    /// must hand the guard and their result to [`Database::finish_write`]
    /// via the surrounding scope; the guard must outlive the commit.
    pub async fn begin_write(&self) -> AppResult<MutexGuard<'_, ()>> {
        let guard = self.write_lock.lock().await;
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(guard)
    }

    /// Commits on success, rolls back on failure, and passes the result
    /// through either way.
    pub async fn finish_write<T>(&self, result: AppResult<T>) -> AppResult<T> {
        match result {
            Ok(value) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(raw: &str) -> AppResult<T> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> AppResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Store(anyhow::anyhow!("invalid timestamp {raw}: {e}")))
}

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
