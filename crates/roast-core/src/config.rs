//! ============================================================================
//! Configuration - Backend selection and model settings
//! ============================================================================
//! Resolution order:
//! 1. Built-in defaults
//! 2. Optional TOML file (explicit path, else ROAST_CONFIG)
//! 3. Environment variables (ROAST_*, GEMINI_API_KEY, XAI_API_KEY, OPENAI_API_KEY)
//!
//! Example file:
//! ```toml
//! [storage]
//! backend = "object_store"
//! object_store_url = "https://storage.example.com/roast-bucket"
//!
//! [model]
//! provider = "gemini"
//! timeout_secs = 30
//! ```
//! ============================================================================

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::ParseError;

pub const DEFAULT_MODEL_ID: &str = "gemini-2.0-pro-exp-02-05";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 400;
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoastConfig {
    pub storage: StorageConfig,
    pub model: ModelConfig,
}

impl RoastConfig {
    /// Load from file (if any) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load with an injectable variable lookup
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => lookup("ROAST_CONFIG").map(PathBuf::from),
        };

        let mut config = match file {
            Some(file) => {
                debug!("Loading config from {}", file.display());
                let raw = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read config {}", file.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config {}", file.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| anyhow!("Failed to parse config: {}", e))
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Storage
        if let Some(v) = get("ROAST_BACKEND") {
            self.storage.backend = v.parse().map_err(|e: ParseError| anyhow!(e))?;
        }
        if let Some(v) = get("ROAST_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ROAST_OBJECT_STORE_URL") {
            self.storage.object_store_url = Some(v);
        }
        if let Some(v) = get("ROAST_OBJECT_STORE_TOKEN") {
            self.storage.object_store_token = Some(v);
        }
        if let Some(v) = get("ROAST_TABLE_URL") {
            self.storage.table_url = Some(v);
        }
        if let Some(v) = get("ROAST_TABLE_KEY") {
            self.storage.table_key = Some(v);
        }

        // Model
        if let Some(v) = get("ROAST_MODEL_PROVIDER") {
            self.model.provider = v.parse().map_err(|e: ParseError| anyhow!(e))?;
        }
        if let Some(v) = get("ROAST_MODEL_ID") {
            self.model.model_id = v;
        }
        if let Some(v) = get("ROAST_MODEL_BASE_URL") {
            self.model.base_url = Some(v);
        }
        if let Some(v) = get("ROAST_MODEL_TIMEOUT_SECS") {
            self.model.timeout_secs = v
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid ROAST_MODEL_TIMEOUT_SECS '{}': {}", v, e))?;
        }

        let key = match self.model.provider {
            ModelProvider::Gemini => get("GEMINI_API_KEY"),
            ModelProvider::OpenAiCompatible => get("XAI_API_KEY").or_else(|| get("OPENAI_API_KEY")),
        };
        if key.is_some() {
            self.model.api_key = key;
        }

        Ok(())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Which set of backends serves credentials, preferences, and usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CSV credentials plus a redb database in the data directory
    #[default]
    Local,
    /// JSON blobs behind an HTTP GET/PUT endpoint
    ObjectStore,
    /// PostgREST-style table API
    HostedTable,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ObjectStore => "object_store",
            Self::HostedTable => "hosted_table",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local" => Ok(Self::Local),
            "object_store" => Ok(Self::ObjectStore),
            "hosted_table" => Ok(Self::HostedTable),
            _ => Err(ParseError {
                kind: "backend",
                value: s.to_string(),
                expected: "local, object_store, hosted_table",
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Directory for users.csv and roast.redb (default ~/.roast)
    pub data_dir: Option<PathBuf>,
    pub object_store_url: Option<String>,
    #[serde(skip_serializing)]
    pub object_store_token: Option<String>,
    pub table_url: Option<String>,
    #[serde(skip_serializing)]
    pub table_key: Option<String>,
}

impl StorageConfig {
    /// Data directory, falling back to ~/.roast
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".roast"))
                .ok_or_else(|| anyhow!("Could not determine home directory")),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    Gemini,
    /// Any `/chat/completions` API (x.ai, OpenAI)
    OpenAiCompatible,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAiCompatible => "openai_compatible",
        }
    }
}

impl FromStr for ModelProvider {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai_compatible" | "openai" | "xai" | "grok" => Ok(Self::OpenAiCompatible),
            _ => Err(ParseError {
                kind: "model provider",
                value: s.to_string(),
                expected: "gemini, openai_compatible",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model_id: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override the provider's API root
    pub base_url: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key: None,
            base_url: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
