//! ============================================================================
//! ROAST-CORE: Resume Roast backend
//! ============================================================================
//! This crate handles all backend logic for Resume Roast:
//! - Credential storage and password digests (flat file, object store, hosted table)
//! - Per-user roast preferences with write-then-verify saves
//! - Append-only usage log with simple aggregation
//! - Prompt rendering and the roast pipeline around a generative-text model
//! ============================================================================

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use auth::{hash_password, AuthOutcome, IdentityService, Page, SessionContext};
pub use config::{BackendKind, ModelConfig, ModelProvider, RoastConfig, StorageConfig};
pub use db::RoastDb;
pub use error::{ModelError, ParseError, StoreError};
pub use intake::{detect_file_type, normalize_whitespace};
pub use model::{create_text_model, GenerationRequest, TextModel};
pub use orchestrator::{RoastOrchestrator, RoastSettings, RoastStage};
pub use prompt::render_prompt;
pub use store::{Backends, PreferenceStore, SaveStatus, UsageLog};
pub use types::*;
