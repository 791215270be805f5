// ============================================================================
// RoastDb - Embedded Database (redb)
// ============================================================================
// Local storage for preferences and the usage log.
// Default path: ~/.roast/roast.redb (override via ROAST_DB_PATH env var)
// ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{PreferenceBackend, UsageBackend};
use crate::types::{PreferenceRecord, UsageEvent};

// Table definitions
const PREFERENCES: TableDefinition<&str, &[u8]> = TableDefinition::new("preferences");
const USAGE: TableDefinition<&str, &[u8]> = TableDefinition::new("usage");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in META holding the next usage sequence number
const USAGE_SEQ_KEY: &str = "usage_seq";

/// Preference record plus local bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPreference {
    record: PreferenceRecord,
    updated_at: i64,
}

/// Row counts for the local database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    pub preference_records: usize,
    pub usage_events: usize,
}

/// Embedded database for preferences and usage events
pub struct RoastDb {
    db: Database,
    path: PathBuf,
}

impl RoastDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses ROAST_DB_PATH env var or ~/.roast/roast.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            p.to_path_buf()
        } else if let Ok(env_path) = std::env::var("ROAST_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let roast_dir = home.join(".roast");
            std::fs::create_dir_all(&roast_dir)
                .map_err(|e| anyhow!("Failed to create .roast directory: {}", e))?;
            roast_dir.join("roast.redb")
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            write_txn.open_table(PREFERENCES).map_err(|e| anyhow!("Failed to create preferences table: {}", e))?;
            write_txn.open_table(USAGE).map_err(|e| anyhow!("Failed to create usage table: {}", e))?;
            write_txn.open_table(META).map_err(|e| anyhow!("Failed to create meta table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        info!("Database ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Preference Operations
    // ========================================================================

    pub fn store_preferences(&self, user_id: &str, record: &PreferenceRecord) -> Result<(), StoreError> {
        let key = format!("prefs:{}", user_id);
        let stored = StoredPreference {
            record: *record,
            updated_at: chrono::Utc::now().timestamp(),
        };
        let value = bincode::serialize(&stored)
            .map_err(StoreError::corrupt("Failed to serialize preferences"))?;

        let write_txn = self.db.begin_write()
            .map_err(StoreError::unavailable("Failed to begin write"))?;
        {
            let mut table = write_txn.open_table(PREFERENCES)
                .map_err(StoreError::unavailable("Failed to open preferences table"))?;
            table.insert(key.as_str(), value.as_slice())
                .map_err(StoreError::unavailable("Failed to insert preferences"))?;
        }
        write_txn.commit().map_err(StoreError::unavailable("Failed to commit"))?;

        debug!("Stored preferences for: {}", user_id);
        Ok(())
    }

    pub fn get_preferences(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError> {
        let key = format!("prefs:{}", user_id);

        let read_txn = self.db.begin_read()
            .map_err(StoreError::unavailable("Failed to begin read"))?;
        let table = read_txn.open_table(PREFERENCES)
            .map_err(StoreError::unavailable("Failed to open preferences table"))?;

        match table.get(key.as_str()).map_err(StoreError::unavailable("Failed to get preferences"))? {
            Some(value) => {
                let stored: StoredPreference = bincode::deserialize(value.value())
                    .map_err(StoreError::corrupt("Failed to deserialize preferences"))?;
                Ok(Some(stored.record))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Usage Operations
    // ========================================================================

    /// Append an event under the next sequence number, in one write transaction
    pub fn append_usage(&self, event: &UsageEvent) -> Result<u64, StoreError> {
        let value = bincode::serialize(event)
            .map_err(StoreError::corrupt("Failed to serialize usage event"))?;

        let write_txn = self.db.begin_write()
            .map_err(StoreError::unavailable("Failed to begin write"))?;
        let seq;
        {
            let mut meta = write_txn.open_table(META)
                .map_err(StoreError::unavailable("Failed to open meta table"))?;
            seq = meta
                .get(USAGE_SEQ_KEY)
                .map_err(StoreError::unavailable("Failed to read usage sequence"))?
                .map(|v| v.value())
                .unwrap_or(0);
            meta.insert(USAGE_SEQ_KEY, seq + 1)
                .map_err(StoreError::unavailable("Failed to bump usage sequence"))?;

            let mut table = write_txn.open_table(USAGE)
                .map_err(StoreError::unavailable("Failed to open usage table"))?;
            let key = usage_key(&event.user_id, seq);
            table.insert(key.as_str(), value.as_slice())
                .map_err(StoreError::unavailable("Failed to insert usage event"))?;
        }
        write_txn.commit().map_err(StoreError::unavailable("Failed to commit"))?;

        debug!("Stored usage event #{} for: {}", seq, event.user_id);
        Ok(seq)
    }

    pub fn list_usage(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        let read_txn = self.db.begin_read()
            .map_err(StoreError::unavailable("Failed to begin read"))?;
        let table = read_txn.open_table(USAGE)
            .map_err(StoreError::unavailable("Failed to open usage table"))?;

        // ':' + 1 == ';', so this range covers exactly the "usage:<id>:" prefix
        let start = format!("usage:{}:", user_id);
        let end = format!("usage:{};", user_id);

        let mut results = Vec::new();
        let iter = table.range::<&str>(start.as_str()..end.as_str())
            .map_err(StoreError::unavailable("Failed to iterate usage"))?;
        for entry in iter {
            let (_key, value) = entry.map_err(StoreError::unavailable("Failed to read entry"))?;
            let event: UsageEvent = bincode::deserialize(value.value())
                .map_err(StoreError::corrupt("Failed to deserialize usage event"))?;

            // Ids containing ':' can share a prefix with another user
            if event.user_id == user_id {
                results.push(event);
            }
        }
        Ok(results)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;

        let prefs = read_txn.open_table(PREFERENCES)
            .map_err(|e| anyhow!("Failed to open preferences table: {}", e))?;
        let usage = read_txn.open_table(USAGE)
            .map_err(|e| anyhow!("Failed to open usage table: {}", e))?;

        Ok(DbStats {
            preference_records: prefs.len().map_err(|e| anyhow!("Failed to count preferences: {}", e))? as usize,
            usage_events: usage.len().map_err(|e| anyhow!("Failed to count usage: {}", e))? as usize,
        })
    }
}

/// Zero-padded sequence keeps lexicographic order equal to append order
fn usage_key(user_id: &str, seq: u64) -> String {
    format!("usage:{}:{:020}", user_id, seq)
}

#[async_trait]
impl PreferenceBackend for RoastDb {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError> {
        self.get_preferences(user_id)
    }

    async fn upsert(&self, user_id: &str, record: &PreferenceRecord) -> Result<(), StoreError> {
        self.store_preferences(user_id, record)
    }
}

#[async_trait]
impl UsageBackend for RoastDb {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        self.append_usage(event).map(|_| ())
    }

    async fn read_all(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        self.list_usage(user_id)
    }
}
