//! Local key-value backup store for LeadPipe.
//!
//! [`KeyValueStore`] is the seam the pipeline depends on. Two implementations:
//! - [`Storage`] wraps a libSQL database (durable, local-only)
//! - [`MemoryStore`] keeps everything in process (tests, ephemeral runs)
//!
//! [`BackupLog`] layers the bounded processed-leads log on top of either.
//! None of this is a source of truth; it only backs up terminal leads.

mod backup;
mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use leadpipe_shared::{LeadPipeError, Result};
use libsql::{Connection, Database, params};
use tracing::info;

pub use backup::{BACKUP_LOG_KEY, BackupLog, UNREADABLE_LOG_KEY};
pub use memory::MemoryStore;

/// String key-value store used for the backup log and capture flags.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Insert or replace the value under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Delete `key` if present.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// libSQL-backed key-value store.
pub struct Storage {
    /// Owns the database `conn` was opened from.
    _db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create the backup database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadPipeError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.migrate().await?;
        Ok(storage)
    }

    /// Open an existing backup database for listings and analytics. Writes are rejected.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeadPipeError::Storage(format!(
                "no backup database at {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            _db: db,
            conn,
            readonly,
        })
    }

    async fn migrate(&self) -> Result<()> {
        let applied = self.schema_version().await?;

        for migration in migrations::all_migrations()
            .into_iter()
            .filter(|m| m.version > applied)
        {
            info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            self.conn.execute_batch(migration.sql).await.map_err(|e| {
                LeadPipeError::Storage(format!("migration v{} failed: {e}", migration.version))
            })?;
        }
        Ok(())
    }

    /// Highest applied migration, 0 for a fresh file.
    async fn schema_version(&self) -> Result<u32> {
        let has_table = {
            let mut rows = self
                .conn
                .query(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
                    params![],
                )
                .await
                .map_err(storage_err)?;
            rows.next().await.map_err(storage_err)?.is_some()
        };
        if !has_table {
            return Ok(0);
        }

        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<u32>(0).map_err(storage_err),
            None => Ok(0),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadPipeError::Storage(
                "backup database is opened read-only".into(),
            ));
        }
        Ok(())
    }
}

fn storage_err(e: libsql::Error) -> LeadPipeError {
    LeadPipeError::Storage(e.to_string())
}

#[async_trait]
impl KeyValueStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.ensure_writable()?;
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}
