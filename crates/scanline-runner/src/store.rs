use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension};
use scanline_core::TriggerId;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    db::init_db,
    error::{Result, RunnerError},
};

/// Opaque per-trigger metadata blob.
pub type Metadata = Map<String, Value>;

/// Persistence for trigger metadata.
///
/// Writes replace the whole blob; readers never observe a partial update.
pub trait MetadataStore: Send + Sync {
    fn load(&self, id: &TriggerId) -> Result<Option<Metadata>>;
    fn store(&self, id: &TriggerId, metadata: &Metadata) -> Result<()>;
    /// Returns `false` if there was nothing to remove.
    fn remove(&self, id: &TriggerId) -> Result<bool>;
}

/// SQLite-backed store; one row per trigger.
pub struct SqliteMetadataStore {
    db: Mutex<Connection>,
}

impl SqliteMetadataStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| RunnerError::LockPoisoned)
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn load(&self, id: &TriggerId) -> Result<Option<Metadata>> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT metadata FROM trigger_metadata WHERE trigger_id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        // An unreadable row must not wedge the trigger; it restarts cold.
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => {
                warn!(trigger_id = %id, "stored metadata is not a JSON object; ignoring");
                Ok(Some(Metadata::new()))
            }
            Err(e) => {
                warn!(trigger_id = %id, "stored metadata is not valid JSON: {e}");
                Ok(Some(Metadata::new()))
            }
        }
    }

    fn store(&self, id: &TriggerId, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO trigger_metadata (trigger_id, metadata, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(trigger_id) DO UPDATE SET
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            rusqlite::params![id.as_str(), json, now],
        )?;
        debug!(trigger_id = %id, "metadata stored");
        Ok(())
    }

    fn remove(&self, id: &TriggerId) -> Result<bool> {
        let n = self.conn()?.execute(
            "DELETE FROM trigger_metadata WHERE trigger_id = ?1",
            [id.as_str()],
        )?;
        Ok(n > 0)
    }
}

/// Process-local store, for tests and single-node deployments without a database.
#[derive(Default)]
pub struct MemoryMetadataStore {
    blobs: DashMap<TriggerId, Metadata>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self, id: &TriggerId) -> Result<Option<Metadata>> {
        Ok(self.blobs.get(id).map(|entry| entry.value().clone()))
    }

    fn store(&self, id: &TriggerId, metadata: &Metadata) -> Result<()> {
        self.blobs.insert(id.clone(), metadata.clone());
        Ok(())
    }

    fn remove(&self, id: &TriggerId) -> Result<bool> {
        Ok(self.blobs.remove(id).is_some())
    }
}
