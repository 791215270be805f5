//! ============================================================================
//! Store Module - Pluggable credential, preference, and usage backends
//! ============================================================================
//! One trait per contract, three interchangeable implementations:
//! - **local**: `users.csv` for credentials, redb for preferences and usage
//! - **object_store**: JSON blobs behind an HTTP GET/PUT bucket
//! - **hosted_table**: PostgREST-style REST tables (e.g. Supabase)
//!
//! Business logic only talks to the traits. [`Backends::from_config`] is the
//! one place that picks an implementation.
//!
//! ## Usage
//! ```rust,ignore
//! use roast_core::{Backends, PreferenceStore, RoastConfig};
//!
//! let config = RoastConfig::load(None)?;
//! let backends = Backends::from_config(&config.storage)?;
//! let prefs = PreferenceStore::new(backends.preferences.clone());
//! let saved = prefs.set("alice", record).await;
//! ```
//! ============================================================================

mod csv_file;
mod hosted;
mod object;
mod preferences;
mod usage;

pub use csv_file::CsvCredentialFile;
pub use hosted::HostedTable;
pub use object::ObjectStore;
pub use preferences::{PreferenceStore, SaveStatus};
pub use usage::UsageLog;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{BackendKind, StorageConfig};
use crate::db::RoastDb;
use crate::error::StoreError;
use crate::types::{PreferenceRecord, UsageEvent};

/// File name of the flat-file credential table inside the data directory
pub const USERS_FILE: &str = "users.csv";

/// File name of the embedded database inside the data directory
pub const DB_FILE: &str = "roast.redb";

/// Durable username -> password digest mapping
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Key the user's preferences and usage are stored under. Derived from
    /// the username alone so a login can only ever reach its own records.
    fn owner_key(&self, username: &str) -> String {
        username.trim().to_string()
    }

    /// Full credential set. Missing storage is an empty map, not an error.
    async fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Persist a new credential. `existing` is the set the caller just loaded,
    /// so whole-file backends can rewrite the union without re-reading.
    async fn insert(
        &self,
        username: &str,
        digest: &str,
        existing: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;
}

/// Durable user id -> preference record mapping
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Canonical form of `user_id` for this backend
    fn normalize_id(&self, user_id: &str) -> Result<String, StoreError> {
        normalize_plain_id(user_id)
    }

    /// Stored record for an already-normalized id
    async fn fetch(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError>;

    /// Insert or replace the record for an already-normalized id
    async fn upsert(&self, user_id: &str, record: &PreferenceRecord) -> Result<(), StoreError>;
}

/// Append-only usage event storage
#[async_trait]
pub trait UsageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError>;

    /// Events for `user_id` in append order
    async fn read_all(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError>;
}

/// Default identifier rule: trimmed, non-empty, printable, no path separators
pub fn normalize_plain_id(user_id: &str) -> Result<String, StoreError> {
    let id = user_id.trim();
    let invalid = id.is_empty()
        || id.chars().any(|c| c.is_control() || matches!(c, '/' | '\\' | '?' | '#'))
        || id == "."
        || id == "..";
    if invalid {
        return Err(StoreError::InvalidIdentifier(user_id.to_string()));
    }
    Ok(id.to_string())
}

/// The three store handles the application runs on
#[derive(Clone)]
pub struct Backends {
    pub credentials: Arc<dyn CredentialBackend>,
    pub preferences: Arc<dyn PreferenceBackend>,
    pub usage: Arc<dyn UsageBackend>,
}

impl Backends {
    /// Build the configured backend set
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let backends = match config.backend {
            BackendKind::Local => {
                let dir = config.resolve_data_dir()?;
                std::fs::create_dir_all(&dir)
                    .map_err(|e| anyhow!("Failed to create data directory {}: {}", dir.display(), e))?;

                let credentials = Arc::new(CsvCredentialFile::new(dir.join(USERS_FILE)));
                let db = Arc::new(RoastDb::open(Some(dir.join(DB_FILE).as_path()))?);
                Self {
                    credentials,
                    preferences: db.clone(),
                    usage: db,
                }
            }
            BackendKind::ObjectStore => {
                let url = config
                    .object_store_url
                    .clone()
                    .ok_or_else(|| anyhow!("object_store backend needs object_store_url (ROAST_OBJECT_STORE_URL)"))?;
                let store = Arc::new(ObjectStore::new(url, config.object_store_token.clone())?);
                Self {
                    credentials: store.clone(),
                    preferences: store.clone(),
                    usage: store,
                }
            }
            BackendKind::HostedTable => {
                let url = config
                    .table_url
                    .clone()
                    .ok_or_else(|| anyhow!("hosted_table backend needs table_url (ROAST_TABLE_URL)"))?;
                let key = config
                    .table_key
                    .clone()
                    .ok_or_else(|| anyhow!("hosted_table backend needs table_key (ROAST_TABLE_KEY)"))?;
                let table = Arc::new(HostedTable::new(url, key)?);
                Self {
                    credentials: table.clone(),
                    preferences: table.clone(),
                    usage: table,
                }
            }
        };

        info!(
            "Storage ready: credentials={}, preferences={}, usage={}",
            backends.credentials.name(),
            backends.preferences.name(),
            backends.usage.name()
        );
        Ok(backends)
    }
}
