//! ============================================================================
//! Preference Store - Default-on-miss reads and write-then-verify saves
//! ============================================================================
//! A save only counts once the record has been read back and matches what
//! was written field for field. Backends may coerce or drop values silently,
//! so a plain "write returned Ok" is never reported as saved.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::PreferenceBackend;
use crate::auth::SessionContext;
use crate::error::StoreError;
use crate::types::PreferenceRecord;

/// Detailed result of a verified save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Written and read back identical
    Verified,
    /// Write went through but the re-read differed (or was missing)
    Mismatch { stored: Option<PreferenceRecord> },
    /// The identifier could not be normalized for this backend
    InvalidIdentifier(String),
    /// The backend failed during the write or the re-read
    Unavailable(String),
    /// No logged-in owner to save for
    NotAuthenticated,
}

impl SaveStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// User-facing message for this status
    pub fn message(&self) -> String {
        match self {
            Self::Verified => "Preferences saved".into(),
            Self::Mismatch { .. } => {
                "Preferences were NOT saved: the stored value did not match, please retry".into()
            }
            Self::InvalidIdentifier(id) => format!("Preferences were NOT saved: invalid user id '{}'", id),
            Self::Unavailable(reason) => format!("Preferences were NOT saved: {}", reason),
            Self::NotAuthenticated => "Preferences were NOT saved: please login first".into(),
        }
    }
}

/// Preference reads and verified writes over a [`PreferenceBackend`]
#[derive(Clone)]
pub struct PreferenceStore {
    backend: Arc<dyn PreferenceBackend>,
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn PreferenceBackend>) -> Self {
        Self { backend }
    }

    /// Stored preferences for `user_id`, or the default record.
    /// The default is never persisted by a read.
    pub async fn get(&self, user_id: &str) -> PreferenceRecord {
        match self.try_get(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No stored preferences for {}, using defaults", user_id);
                PreferenceRecord::default()
            }
            Err(e) => {
                warn!("Failed to read preferences for {}: {} - using defaults", user_id, e);
                PreferenceRecord::default()
            }
        }
    }

    /// Stored preferences without the default fallback
    pub async fn try_get(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError> {
        let id = self.backend.normalize_id(user_id)?;
        self.backend.fetch(&id).await
    }

    /// Preferences of the session's own user; defaults when logged out
    pub async fn get_for(&self, session: &SessionContext) -> PreferenceRecord {
        match session.user() {
            Some(id) => self.get(id).await,
            None => PreferenceRecord::default(),
        }
    }

    /// Save on behalf of the session's own user. Logged-out sessions are refused.
    pub async fn save_for(&self, session: &SessionContext, record: PreferenceRecord) -> SaveStatus {
        match session.user() {
            Some(id) => self.save(id, record).await,
            None => {
                warn!("Refusing to save preferences without a login");
                SaveStatus::NotAuthenticated
            }
        }
    }

    /// Save and verify. True only when the re-read matches `record` exactly.
    pub async fn set(&self, user_id: &str, record: PreferenceRecord) -> bool {
        self.save(user_id, record).await.is_verified()
    }

    /// Save and verify, reporting why a save did not stick
    pub async fn save(&self, user_id: &str, record: PreferenceRecord) -> SaveStatus {
        let id = match self.backend.normalize_id(user_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("Refusing to save preferences: {}", e);
                return SaveStatus::InvalidIdentifier(user_id.to_string());
            }
        };

        if let Err(e) = self.backend.upsert(&id, &record).await {
            warn!("Failed to write preferences for {}: {}", id, e);
            return SaveStatus::Unavailable(e.to_string());
        }

        let stored = match self.backend.fetch(&id).await {
            Ok(stored) => stored,
            Err(StoreError::Corrupt(reason)) => {
                warn!("Preferences for {} read back corrupt: {}", id, reason);
                return SaveStatus::Mismatch { stored: None };
            }
            Err(e) => {
                warn!("Failed to re-read preferences for {}: {}", id, e);
                return SaveStatus::Unavailable(e.to_string());
            }
        };

        if stored == Some(record) {
            info!(
                "Saved preferences for {} ({} / {}, {} backend)",
                id,
                record.roast_style,
                record.intensity,
                self.backend.name()
            );
            SaveStatus::Verified
        } else {
            warn!(
                "Preference verification failed for {}: wrote {:?}, read back {:?}",
                id, record, stored
            );
            SaveStatus::Mismatch { stored }
        }
    }
}
