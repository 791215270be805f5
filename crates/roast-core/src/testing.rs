//! In-memory fakes for the store and model traits.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ModelError, StoreError};
use crate::model::{GenerationRequest, TextModel};
use crate::store::{CredentialBackend, PreferenceBackend, UsageBackend};
use crate::types::{PreferenceRecord, UsageEvent};

fn offline() -> StoreError {
    StoreError::Unavailable("fake backend offline".into())
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Default)]
pub struct MemoryCredentials {
    users: Mutex<BTreeMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryCredentials {
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.users.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialBackend for MemoryCredentials {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self.snapshot())
    }

    async fn insert(
        &self,
        username: &str,
        digest: &str,
        _existing: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.users
            .lock()
            .unwrap()
            .insert(username.to_string(), digest.to_string());
        Ok(())
    }
}

// ============================================================================
// Preferences
// ============================================================================

#[derive(Default)]
pub struct MemoryPreferences {
    records: Mutex<HashMap<String, PreferenceRecord>>,
    /// Every write stores this record instead of the requested one
    corrupt_to: Mutex<Option<PreferenceRecord>>,
    dropping: AtomicBool,
    failing: AtomicBool,
}

impl MemoryPreferences {
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    pub fn corrupt_writes_to(&self, record: PreferenceRecord) {
        *self.corrupt_to.lock().unwrap() = Some(record);
    }

    /// Accept writes without storing them
    pub fn drop_writes(&self) {
        self.dropping.store(true, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PreferenceBackend for MemoryPreferences {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self.records.lock().unwrap().get(user_id).copied())
    }

    async fn upsert(&self, user_id: &str, record: &PreferenceRecord) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        if self.dropping.load(Ordering::SeqCst) {
            return Ok(());
        }
        let stored = self.corrupt_to.lock().unwrap().unwrap_or(*record);
        self.records
            .lock()
            .unwrap()
            .insert(user_id.to_string(), stored);
        Ok(())
    }
}

// ============================================================================
// Usage
// ============================================================================

#[derive(Default)]
pub struct MemoryUsage {
    events: Mutex<Vec<UsageEvent>>,
    failing: AtomicBool,
}

impl MemoryUsage {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl UsageBackend for MemoryUsage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn read_all(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Model
// ============================================================================

/// Replays queued responses; falls back to `Err(Empty)` once drained
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Sleep before answering, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ModelError::Empty))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Serve `body` with `status` for every request. Returns the base URL.
pub async fn serve_fixed(status: u16, body: &'static str) -> String {
    use axum::http::{header, StatusCode};

    let status = StatusCode::from_u16(status).unwrap();
    let app = axum::Router::new().fallback(move || async move {
        (status, [(header::CONTENT_TYPE, "application/json")], body)
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// A small request for model client tests
pub fn sample_request() -> GenerationRequest {
    GenerationRequest {
        prompt: "Roast this resume: ten years of Excel".into(),
        max_output_tokens: 64,
        temperature: 0.5,
    }
}
