//! ============================================================================
//! Identity Service - Register and authenticate over any credential backend
//! ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::password::hash_password;
use crate::error::StoreError;
use crate::store::{normalize_plain_id, CredentialBackend};

/// Longest accepted username, in characters
pub const MAX_USERNAME_LEN: usize = 128;

/// Register-if-absent and password checks against a [`CredentialBackend`]
#[derive(Clone)]
pub struct IdentityService {
    backend: Arc<dyn CredentialBackend>,
}

impl IdentityService {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// Name of the backing store, for log lines
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Owner key for `username` on this backend
    pub fn owner_key(&self, username: &str) -> String {
        self.backend.owner_key(username)
    }

    /// Every known username mapped to its digest. Empty when nothing was stored yet.
    pub async fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.backend.load_all().await
    }

    /// Whether a username is already registered
    pub async fn exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.load_all().await?.contains_key(username.trim()))
    }

    /// Register a new user.
    ///
    /// Returns `Ok(false)` for invalid input or a taken username; the stored
    /// digest is left untouched in that case. `Err` means storage failed.
    pub async fn register(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        if let Err(e) = validate_credentials(username, password) {
            debug!("Registration refused: {}", e);
            return Ok(false);
        }
        let username = username.trim();

        let existing = self.load_all().await?;
        if existing.contains_key(username) {
            debug!("Registration refused, username already taken: {}", username);
            return Ok(false);
        }

        self.backend
            .insert(username, &hash_password(password), &existing)
            .await?;

        info!("Registered user {} ({} backend)", username, self.backend.name());
        Ok(true)
    }

    /// Check a username/password pair.
    ///
    /// Unknown usernames and wrong passwords both come back as `Ok(false)`.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        // Hash before the lookup so both failure paths do the same work.
        let digest = hash_password(password);
        let users = self.load_all().await?;

        let matched = users
            .get(username.trim())
            .map(|stored| stored == &digest)
            .unwrap_or(false);

        debug!("Authentication for {}: {}", username.trim(), matched);
        Ok(matched)
    }
}

/// Reject registration input that could not later key a preference record.
/// Usernames follow the same rule as plain preference ids.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), StoreError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(StoreError::Validation(
            "Please provide both username and password".into(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(StoreError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.chars().any(char::is_control) {
        return Err(StoreError::Validation(
            "Username must not contain control characters".into(),
        ));
    }
    if normalize_plain_id(username).is_err() {
        return Err(StoreError::Validation(
            "Username must not contain '/', '\\', '?' or '#', or be '.' or '..'".into(),
        ));
    }
    Ok(())
}
