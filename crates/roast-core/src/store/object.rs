//! ============================================================================
//! Object Store - JSON blobs behind an HTTP GET/PUT bucket
//! ============================================================================
//! Works against any path-style blob endpoint (S3-compatible bucket URL,
//! presigned gateway, or a plain file server that accepts PUT):
//! - `users.json`              username -> digest map
//! - `preferences/<id>.json`   one PreferenceRecord per user
//! - `usage/<id>.json`         array of UsageEvent, append order
//!
//! A 404 means "absent". Every write is a whole-object PUT; appends are
//! read-modify-write and race like any other last-writer-wins store.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{CredentialBackend, PreferenceBackend, UsageBackend};
use crate::error::StoreError;
use crate::types::{PreferenceRecord, UsageEvent};

/// Object key of the credential map
pub const USERS_OBJECT: &str = "users.json";

/// Credential, preference, and usage storage in an HTTP object store
pub struct ObjectStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ObjectStore {
    /// Create a store rooted at `base_url` (e.g. `https://s3.example.com/roast-bucket`)
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| anyhow!("Invalid object store URL '{}': {}", base_url, e))?;

        Ok(Self {
            client: Client::new(),
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of an object key
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn preference_key(user_id: &str) -> String {
        format!("preferences/{}.json", urlencoding::encode(user_id))
    }

    fn usage_key(user_id: &str) -> String {
        format!("usage/{}.json", urlencoding::encode(user_id))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET and decode an object. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let url = self.object_url(key);
        debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(StoreError::unavailable("Failed to reach object store"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "Object store GET {} failed {}: {}",
                key, status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(StoreError::unavailable("Failed to read object body"))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("Object {} is not valid JSON: {}", key, e)))?;
        Ok(Some(value))
    }

    /// Encode and PUT an object, replacing whatever was there
    async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let url = self.object_url(key);
        let body = serde_json::to_vec(value)
            .map_err(StoreError::corrupt("Failed to encode object"))?;
        debug!("PUT {} ({} bytes)", url, body.len());

        let response = self
            .authorize(self.client.put(&url))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(StoreError::unavailable("Failed to reach object store"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "Object store PUT {} failed {}: {}",
                key, status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialBackend for ObjectStore {
    fn name(&self) -> &'static str {
        "object_store"
    }

    async fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match self.get_json::<BTreeMap<String, String>>(USERS_OBJECT).await? {
            Some(users) => Ok(users),
            None => {
                info!("No {} in object store, creating an empty one", USERS_OBJECT);
                self.put_json(USERS_OBJECT, &BTreeMap::<String, String>::new()).await?;
                Ok(BTreeMap::new())
            }
        }
    }

    async fn insert(
        &self,
        username: &str,
        digest: &str,
        existing: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut users = existing.clone();
        users.insert(username.to_string(), digest.to_string());
        self.put_json(USERS_OBJECT, &users).await
    }
}

#[async_trait]
impl PreferenceBackend for ObjectStore {
    fn name(&self) -> &'static str {
        "object_store"
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError> {
        self.get_json(&Self::preference_key(user_id)).await
    }

    async fn upsert(&self, user_id: &str, record: &PreferenceRecord) -> Result<(), StoreError> {
        self.put_json(&Self::preference_key(user_id), record).await
    }
}

#[async_trait]
impl UsageBackend for ObjectStore {
    fn name(&self) -> &'static str {
        "object_store"
    }

    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        let key = Self::usage_key(&event.user_id);
        let mut events: Vec<UsageEvent> = self.get_json(&key).await?.unwrap_or_default();
        events.push(event.clone());
        self.put_json(&key, &events).await
    }

    async fn read_all(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        Ok(self.get_json(&Self::usage_key(user_id)).await?.unwrap_or_default())
    }
}
