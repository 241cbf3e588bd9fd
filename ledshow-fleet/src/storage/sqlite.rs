use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use tokio::sync::Mutex;

use ledshow_core::{Device, ScheduleEntry, ScheduleId};

use crate::storage::{DeviceStore, ScheduleStore};

/// SQLite-backed store.
/// Records are JSON blobs keyed on the stable identity, written with
/// `INSERT OR REPLACE` so reloading after a restart never duplicates.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: r#"
            CREATE TABLE IF NOT EXISTS devices (
                name TEXT PRIMARY KEY,
                device_json TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS schedule_entries (
                id TEXT PRIMARY KEY,
                entry_json TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
        "#,
}];

impl SqliteStore {
    /// Opens or creates the SQLite database at the given path.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(path).map_err(|e| {
            SqliteStoreError::ConnectionFailed(format!("Failed to open SQLite DB: {}", e))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), SqliteStoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| SqliteStoreError::MigrationFailed(e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT COALESCE(version, 0) FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for migration in MIGRATIONS.iter() {
            if migration.version > current_version {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| SqliteStoreError::TransactionFailed(e.to_string()))?;

                tx.execute_batch(migration.sql)
                    .map_err(|e| SqliteStoreError::MigrationFailed(e.to_string()))?;

                tx.execute(
                    "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
                    params![migration.version],
                )
                .map_err(|e| SqliteStoreError::MigrationFailed(e.to_string()))?;

                tx.commit()
                    .map_err(|e| SqliteStoreError::TransactionFailed(e.to_string()))?;
            }
        }

        Ok(())
    }

    fn row_json(row: &Row<'_>) -> Result<String, rusqlite::Error> {
        row.get(0)
    }
}

#[async_trait]
impl DeviceStore for SqliteStore {
    type Error = SqliteStoreError;

    async fn upsert_device(&self, device: &Device) -> Result<(), Self::Error> {
        let json = serde_json::to_string(device)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO devices (name, device_json) VALUES (?, ?)",
            params![device.name.as_str(), json],
        )?;

        Ok(())
    }

    async fn upsert_devices(&self, devices: &[Device]) -> Result<(), Self::Error> {
        if devices.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| SqliteStoreError::TransactionFailed(e.to_string()))?;

        for device in devices {
            let json = serde_json::to_string(device)?;
            tx.execute(
                "INSERT OR REPLACE INTO devices (name, device_json) VALUES (?, ?)",
                params![device.name.as_str(), json],
            )?;
        }

        tx.commit()
            .map_err(|e| SqliteStoreError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    async fn load_devices(&self) -> Result<Vec<Device>, Self::Error> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare("SELECT device_json FROM devices ORDER BY name")?;
        let rows = stmt.query_map([], Self::row_json)?;

        let mut devices = Vec::new();
        for row in rows {
            let json = row?;
            devices.push(serde_json::from_str(&json)?);
        }

        Ok(devices)
    }
}

#[async_trait]
impl ScheduleStore for SqliteStore {
    type Error = SqliteStoreError;

    async fn upsert_entry(&self, entry: &ScheduleEntry) -> Result<(), Self::Error> {
        let json = serde_json::to_string(entry)?;
        let id_str = entry.id.0.to_string();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO schedule_entries (id, entry_json) VALUES (?, ?)",
            params![id_str, json],
        )?;

        Ok(())
    }

    async fn remove_entry(&self, id: ScheduleId) -> Result<bool, Self::Error> {
        let id_str = id.0.to_string();

        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM schedule_entries WHERE id = ?",
            params![id_str],
        )?;

        Ok(removed > 0)
    }

    async fn load_entries(&self) -> Result<Vec<ScheduleEntry>, Self::Error> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare("SELECT entry_json FROM schedule_entries ORDER BY id")?;
        let rows = stmt.query_map([], Self::row_json)?;

        let mut entries = Vec::new();
        for row in rows {
            let json = row?;
            entries.push(serde_json::from_str(&json)?);
        }

        Ok(entries)
    }
}
