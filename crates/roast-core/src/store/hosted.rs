//! ============================================================================
//! Hosted Table - PostgREST-style REST tables (Supabase and friends)
//! ============================================================================
//! Tables:
//! - `users`            (username text primary key, password text)
//! - `user_preferences` (user_id uuid primary key, roast_style text,
//!                       intensity text, updated_at timestamptz)
//! - `usage_logs`       (id bigserial, user_id text, file_type text,
//!                       processing_time float8, output_length int,
//!                       success bool, timestamp timestamptz)
//!
//! Preference rows are keyed by UUID, so identifiers are normalized to the
//! lowercase hyphenated form before any request. A username's owner key is a
//! v5 UUID derived from the name.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use super::{CredentialBackend, PreferenceBackend, UsageBackend};
use crate::error::StoreError;
use crate::types::{now_timestamp, FileType, PreferenceRecord, UsageEvent};

const USERS_TABLE: &str = "users";
const PREFERENCES_TABLE: &str = "user_preferences";
const USAGE_TABLE: &str = "usage_logs";

#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    username: String,
    password: String,
}

/// Columns come back as free text; parsing them is where coercion shows up.
#[derive(Debug, Serialize, Deserialize)]
struct PreferenceRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    roast_style: String,
    intensity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl PreferenceRow {
    fn into_record(self) -> Result<PreferenceRecord, StoreError> {
        let roast_style = self
            .roast_style
            .parse()
            .map_err(StoreError::corrupt("Bad roast_style column"))?;
        let intensity = self
            .intensity
            .parse()
            .map_err(StoreError::corrupt("Bad intensity column"))?;
        Ok(PreferenceRecord { roast_style, intensity })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageRow {
    user_id: String,
    file_type: String,
    processing_time: f64,
    output_length: u64,
    success: bool,
    timestamp: String,
}

impl From<&UsageEvent> for UsageRow {
    fn from(event: &UsageEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            file_type: event.file_type.as_str().to_string(),
            processing_time: event.processing_time_seconds,
            output_length: event.output_length_chars,
            success: event.success,
            timestamp: event.timestamp.clone(),
        }
    }
}

impl From<UsageRow> for UsageEvent {
    fn from(row: UsageRow) -> Self {
        Self {
            user_id: row.user_id,
            file_type: FileType::from_declared(&row.file_type),
            processing_time_seconds: row.processing_time,
            output_length_chars: row.output_length,
            success: row.success,
            timestamp: row.timestamp,
        }
    }
}

/// Canonical UUID form for hosted-table identifiers.
/// Accepts hyphenated, simple, braced and URN forms in any case.
pub fn normalize_uuid(user_id: &str) -> Result<String, StoreError> {
    Uuid::parse_str(user_id.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| StoreError::InvalidIdentifier(user_id.to_string()))
}

/// Owner key for a username: a name-based (v5) UUID, stable across logins
pub fn owner_uuid(username: &str) -> String {
    let name = format!("roast:user:{}", username.trim());
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
        .hyphenated()
        .to_string()
}

/// Store backed by a PostgREST-compatible REST API
pub struct HostedTable {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HostedTable {
    /// `base_url` is the REST root, e.g. `https://<project>.supabase.co/rest/v1`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| anyhow!("Invalid table URL '{}': {}", base_url, e))?;

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        debug!("SELECT {} {:?}", table, query);

        let response = self
            .with_auth(self.client.get(self.table_url(table)))
            .query(query)
            .send()
            .await
            .map_err(StoreError::unavailable("Failed to reach table API"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "Select from {} failed {}: {}",
                table, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(StoreError::corrupt("Failed to decode table rows"))
    }

    async fn insert_rows<T: Serialize + Sync>(
        &self,
        table: &str,
        rows: &[T],
        upsert_on: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut request = self.with_auth(self.client.post(self.table_url(table)));
        let prefer = match upsert_on {
            Some(column) => {
                request = request.query(&[("on_conflict", column)]);
                "resolution=merge-duplicates,return=minimal"
            }
            None => "return=minimal",
        };

        let response = request
            .header("Prefer", prefer)
            .json(rows)
            .send()
            .await
            .map_err(StoreError::unavailable("Failed to reach table API"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "Insert into {} failed {}: {}",
                table, status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialBackend for HostedTable {
    fn name(&self) -> &'static str {
        "hosted_table"
    }

    fn owner_key(&self, username: &str) -> String {
        owner_uuid(username)
    }

    async fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let rows: Vec<UserRow> = self
            .select(USERS_TABLE, &[("select", "username,password".to_string())])
            .await?;
        Ok(rows.into_iter().map(|r| (r.username, r.password)).collect())
    }

    async fn insert(
        &self,
        username: &str,
        digest: &str,
        _existing: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        // Row-level insert; the table already holds everyone else
        let row = UserRow {
            username: username.to_string(),
            password: digest.to_string(),
        };
        self.insert_rows(USERS_TABLE, &[row], None).await
    }
}

#[async_trait]
impl PreferenceBackend for HostedTable {
    fn name(&self) -> &'static str {
        "hosted_table"
    }

    fn normalize_id(&self, user_id: &str) -> Result<String, StoreError> {
        normalize_uuid(user_id)
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<PreferenceRecord>, StoreError> {
        let rows: Vec<PreferenceRow> = self
            .select(
                PREFERENCES_TABLE,
                &[
                    ("select", "roast_style,intensity".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                ],
            )
            .await?;

        rows.into_iter().next().map(PreferenceRow::into_record).transpose()
    }

    async fn upsert(&self, user_id: &str, record: &PreferenceRecord) -> Result<(), StoreError> {
        let row = PreferenceRow {
            user_id: Some(user_id.to_string()),
            roast_style: record.roast_style.as_str().to_string(),
            intensity: record.intensity.as_str().to_string(),
            updated_at: Some(now_timestamp()),
        };
        self.insert_rows(PREFERENCES_TABLE, &[row], Some("user_id")).await
    }
}

#[async_trait]
impl UsageBackend for HostedTable {
    fn name(&self) -> &'static str {
        "hosted_table"
    }

    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        self.insert_rows(USAGE_TABLE, &[UsageRow::from(event)], None).await
    }

    async fn read_all(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        let rows: Vec<UsageRow> = self
            .select(
                USAGE_TABLE,
                &[
                    (
                        "select",
                        "user_id,file_type,processing_time,output_length,success,timestamp".to_string(),
                    ),
                    ("user_id", format!("eq.{}", user_id)),
                    ("order", "id.asc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(UsageEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityService, SessionContext};
    use crate::store::{PreferenceStore, SaveStatus, UsageLog};
    use crate::types::{Intensity, RoastStyle};
    use axum::extract::{Path, Query, State};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const KEY: &str = "service-key";

    /// Rows per table plus knobs for misbehaving
    #[derive(Default)]
    struct FakeTables {
        rows: HashMap<String, Vec<Value>>,
        next_id: u64,
        /// Overwrites roast_style on every preference write
        coerce_style: Option<&'static str>,
        failing: bool,
        prefer_headers: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeTables>>;

    fn check(db: &FakeTables, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
        if db.failing {
            return Err((StatusCode::SERVICE_UNAVAILABLE, "database offline".into()));
        }
        let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
        let bearer = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        let expected = format!("Bearer {}", KEY);
        if apikey != Some(KEY) || bearer != Some(expected.as_str()) {
            return Err((StatusCode::UNAUTHORIZED, "Invalid API key".into()));
        }
        Ok(())
    }

    fn column(row: &Value, name: &str) -> String {
        match &row[name] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    async fn select_rows(
        State(db): State<Shared>,
        Path(table): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
        let db = db.lock().unwrap();
        check(&db, &headers)?;

        let mut rows = db.rows.get(&table).cloned().unwrap_or_default();
        for (name, filter) in &query {
            if let Some(wanted) = filter.strip_prefix("eq.") {
                rows.retain(|row| column(row, name) == wanted);
            }
        }
        if query.get("order").map(String::as_str) == Some("id.asc") {
            rows.sort_by_key(|row| row["id"].as_u64());
        }
        if let Some(columns) = query.get("select") {
            let columns: Vec<&str> = columns.split(',').collect();
            for row in rows.iter_mut() {
                if let Value::Object(fields) = row {
                    fields.retain(|name, _| columns.contains(&name.as_str()));
                }
            }
        }
        Ok(Json(rows))
    }

    async fn insert_rows(
        State(db): State<Shared>,
        Path(table): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(new_rows): Json<Vec<Value>>,
    ) -> (StatusCode, String) {
        let mut db = db.lock().unwrap();
        if let Err(refused) = check(&db, &headers) {
            return refused;
        }

        let prefer = headers
            .get("prefer")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        db.prefer_headers.push(prefer.clone());
        let merge = prefer.contains("resolution=merge-duplicates");

        let primary_key = match table.as_str() {
            USERS_TABLE => Some("username"),
            PREFERENCES_TABLE => Some("user_id"),
            _ => None,
        };
        let upsert = merge && primary_key.is_some()
            && query.get("on_conflict").map(String::as_str) == primary_key;

        for mut row in new_rows {
            if table == PREFERENCES_TABLE {
                if let Some(style) = db.coerce_style {
                    row["roast_style"] = Value::from(style);
                }
            }
            if table == USAGE_TABLE {
                db.next_id += 1;
                row["id"] = Value::from(db.next_id);
            }

            let rows = db.rows.entry(table.clone()).or_default();
            if let Some(key) = primary_key {
                let id = column(&row, key);
                if let Some(existing) = rows.iter_mut().find(|r| column(r, key) == id) {
                    if !upsert {
                        return (StatusCode::CONFLICT, format!("duplicate key value for {}", key));
                    }
                    *existing = row;
                    continue;
                }
            }
            // Newest first: only an explicit order returns append order
            rows.insert(0, row);
        }
        (StatusCode::CREATED, String::new())
    }

    /// In-process PostgREST stand-in serving every table under /rest/v1
    async fn spawn_tables() -> (String, Shared) {
        let db: Shared = Arc::default();
        let app = Router::new()
            .route("/rest/v1/{table}", get(select_rows).post(insert_rows))
            .with_state(db.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/rest/v1", addr), db)
    }

    fn usage_event(user_id: &str, seconds: f64) -> UsageEvent {
        UsageEvent {
            user_id: user_id.into(),
            file_type: FileType::Pdf,
            processing_time_seconds: seconds,
            output_length_chars: 100,
            success: true,
            timestamp: now_timestamp(),
        }
    }

    #[test]
    fn test_uuid_normalization() {
        let canonical = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(normalize_uuid(canonical).unwrap(), canonical);
        assert_eq!(
            normalize_uuid("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap(),
            canonical
        );
        assert_eq!(normalize_uuid("67e5504410b1426f9247bb680e5fe0c8").unwrap(), canonical);
        assert_eq!(
            normalize_uuid("{67e55044-10b1-426f-9247-bb680e5fe0c8}").unwrap(),
            canonical
        );
        assert_eq!(
            normalize_uuid(" urn:uuid:67e55044-10b1-426f-9247-bb680e5fe0c8 ").unwrap(),
            canonical
        );
    }

    #[test]
    fn test_non_uuid_is_invalid_identifier() {
        let table = HostedTable::new("https://example.supabase.co/rest/v1/", "key").unwrap();
        assert_eq!(
            table.normalize_id("alice"),
            Err(StoreError::InvalidIdentifier("alice".into()))
        );
        assert_eq!(
            table.table_url(PREFERENCES_TABLE),
            "https://example.supabase.co/rest/v1/user_preferences"
        );
    }

    #[test]
    fn test_preference_row_parsing() {
        let row: PreferenceRow =
            serde_json::from_str(r#"{"roast_style":"savage","intensity":"high"}"#).unwrap();
        assert_eq!(
            row.into_record().unwrap(),
            PreferenceRecord::new(RoastStyle::Savage, Intensity::High)
        );

        let coerced: PreferenceRow =
            serde_json::from_str(r#"{"roast_style":"3","intensity":"high"}"#).unwrap();
        assert!(matches!(coerced.into_record(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_upsert_row_shape() {
        let row = PreferenceRow {
            user_id: Some("67e55044-10b1-426f-9247-bb680e5fe0c8".into()),
            roast_style: "gentle".into(),
            intensity: "low".into(),
            updated_at: None,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["user_id"], "67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_usage_row_mapping() {
        let event = UsageEvent {
            user_id: "alice".into(),
            file_type: FileType::Pdf,
            processing_time_seconds: 2.5,
            output_length_chars: 640,
            success: true,
            timestamp: "2025-02-05T10:00:00.000Z".into(),
        };
        let row = UsageRow::from(&event);
        assert_eq!(row.file_type, "pdf");
        assert_eq!(UsageEvent::from(row), event);
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(HostedTable::new("::nope::", "key").is_err());
    }

    // Requires a live Supabase project with the tables above
    #[tokio::test]
    #[ignore]
    async fn test_live_round_trip() {
        let url = std::env::var("ROAST_TABLE_URL").unwrap();
        let key = std::env::var("ROAST_TABLE_KEY").unwrap();
        let table = std::sync::Arc::new(HostedTable::new(url, key).unwrap());
        let prefs = crate::store::PreferenceStore::new(table);

        let id = Uuid::new_v4().to_string();
        let record = PreferenceRecord::new(RoastStyle::Gentle, Intensity::Low);
        assert!(prefs.set(&id, record).await);
        assert_eq!(prefs.get(&id).await, record);
    }

    #[test]
    fn test_owner_uuid_is_stable_per_name() {
        let alice = owner_uuid("alice");
        assert_eq!(alice, owner_uuid("  alice "));
        assert_ne!(alice, owner_uuid("bob"));
        assert_eq!(normalize_uuid(&alice).unwrap(), alice);
        assert_eq!(Uuid::parse_str(&alice).unwrap().get_version_num(), 5);
    }

    #[tokio::test]
    async fn test_identity_over_hosted_table() {
        let (url, db) = spawn_tables().await;
        let identity = IdentityService::new(Arc::new(HostedTable::new(url, KEY).unwrap()));

        assert!(identity.register("alice", "x").await.unwrap());
        assert!(!identity.register("alice", "y").await.unwrap());
        assert!(identity.authenticate("alice", "x").await.unwrap());
        assert!(!identity.authenticate("alice", "y").await.unwrap());
        assert!(!identity.authenticate("nobody", "x").await.unwrap());
        assert_eq!(identity.owner_key("alice"), owner_uuid("alice"));

        let db = db.lock().unwrap();
        assert_eq!(db.rows[USERS_TABLE].len(), 1);
        assert_eq!(db.prefer_headers, vec!["return=minimal".to_string()]);
    }

    #[tokio::test]
    async fn test_preferences_upsert_and_verify() {
        let (url, db) = spawn_tables().await;
        let prefs = PreferenceStore::new(Arc::new(HostedTable::new(url, KEY).unwrap()));
        let id = owner_uuid("alice");

        assert_eq!(prefs.get(&id).await, PreferenceRecord::default());
        assert!(prefs.set(&id, PreferenceRecord::new(RoastStyle::Savage, Intensity::High)).await);
        // Second write for the same owner must merge, not conflict
        let gentle = PreferenceRecord::new(RoastStyle::Gentle, Intensity::Low);
        assert!(prefs.set(&id.to_uppercase(), gentle).await);
        assert_eq!(prefs.get(&id).await, gentle);

        let db = db.lock().unwrap();
        assert_eq!(db.rows[PREFERENCES_TABLE].len(), 1);
        assert_eq!(db.rows[PREFERENCES_TABLE][0]["user_id"], id.as_str());
        assert!(db
            .prefer_headers
            .iter()
            .all(|p| p == "resolution=merge-duplicates,return=minimal"));
    }

    #[tokio::test]
    async fn test_coerced_write_is_not_verified() {
        let (url, db) = spawn_tables().await;
        let prefs = PreferenceStore::new(Arc::new(HostedTable::new(url, KEY).unwrap()));
        let id = owner_uuid("alice");
        let wanted = PreferenceRecord::new(RoastStyle::Savage, Intensity::High);

        db.lock().unwrap().coerce_style = Some("3");
        assert!(!prefs.set(&id, wanted).await);
        assert_eq!(prefs.save(&id, wanted).await, SaveStatus::Mismatch { stored: None });

        db.lock().unwrap().coerce_style = Some("gentle");
        assert_eq!(
            prefs.save(&id, wanted).await,
            SaveStatus::Mismatch {
                stored: Some(PreferenceRecord::new(RoastStyle::Gentle, Intensity::High))
            }
        );
    }

    #[tokio::test]
    async fn test_usage_reads_back_in_append_order() {
        let (url, _db) = spawn_tables().await;
        let log = UsageLog::new(Arc::new(HostedTable::new(url, KEY).unwrap()));
        let alice = owner_uuid("alice");
        let bob = owner_uuid("bob");

        for seconds in [1.0, 2.0, 3.0] {
            assert!(log.append(&usage_event(&alice, seconds)).await);
        }
        assert!(log.append(&usage_event(&bob, 9.0)).await);

        let times: Vec<f64> = log
            .read_all(&alice)
            .await
            .unwrap()
            .iter()
            .map(|e| e.processing_time_seconds)
            .collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert_eq!(log.aggregate(&bob).await.count, 1);
    }

    #[tokio::test]
    async fn test_login_keys_preferences_by_owner_uuid() {
        let (url, _db) = spawn_tables().await;
        let table = Arc::new(HostedTable::new(url, KEY).unwrap());
        let identity = IdentityService::new(table.clone());
        let prefs = PreferenceStore::new(table);
        assert!(identity.register("alice", "pw").await.unwrap());

        let mut session = SessionContext::new();
        assert!(session.login(&identity, "alice", "pw").await.is_success());
        assert_eq!(session.user(), Some(owner_uuid("alice").as_str()));

        let record = PreferenceRecord::new(RoastStyle::Balanced, Intensity::High);
        assert_eq!(prefs.save_for(&session, record).await, SaveStatus::Verified);
        assert_eq!(prefs.get_for(&session).await, record);
    }

    #[tokio::test]
    async fn test_error_status_is_unavailable() {
        let (url, db) = spawn_tables().await;
        let table = Arc::new(HostedTable::new(url, KEY).unwrap());
        db.lock().unwrap().failing = true;
        let id = owner_uuid("alice");

        assert!(matches!(table.load_all().await, Err(StoreError::Unavailable(e)) if e.contains("503")));
        assert!(matches!(table.fetch(&id).await, Err(StoreError::Unavailable(_))));
        assert!(matches!(
            table.upsert(&id, &PreferenceRecord::default()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(table.read_all(&id).await, Err(StoreError::Unavailable(_))));

        let identity = IdentityService::new(table.clone());
        assert!(matches!(identity.register("alice", "x").await, Err(StoreError::Unavailable(_))));
        let prefs = PreferenceStore::new(table.clone());
        assert!(matches!(
            prefs.save(&id, PreferenceRecord::default()).await,
            SaveStatus::Unavailable(_)
        ));
        assert!(!UsageLog::new(table).append(&usage_event(&id, 1.0)).await);
    }

    #[tokio::test]
    async fn test_wrong_api_key_is_unavailable() {
        let (url, _db) = spawn_tables().await;
        let table = HostedTable::new(url, "not-the-key").unwrap();

        assert!(matches!(table.load_all().await, Err(StoreError::Unavailable(e)) if e.contains("401")));
    }
}
