//! ============================================================================
//! Model Module - Generative-text collaborators
//! ============================================================================
//! The roast pipeline only sees [`TextModel`]. Two HTTP clients implement it:
//! - GeminiClient: Google Generative Language `generateContent`
//! - ChatCompletionsClient: OpenAI-compatible `/chat/completions` (x.ai, OpenAI)
//!
//! Both treat "returned but empty" exactly like a failed call.
//! ============================================================================

mod chat;
mod gemini;

pub use chat::ChatCompletionsClient;
pub use gemini::GeminiClient;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ModelConfig, ModelProvider};
use crate::error::ModelError;

/// Parameters for one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    /// Sampling temperature in [0, 1]
    pub temperature: f32,
}

/// A remote generative-text model
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model identifier recorded on every outcome
    fn model_id(&self) -> &str;

    /// Generate text for a prompt. Empty output is `Err(ModelError::Empty)`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;
}

/// Build the configured model client.
///
/// A missing API key is not fatal: the returned model fails every call with
/// `ModelError::NotConfigured`, which the pipeline records like any other
/// failed roast.
pub fn create_text_model(config: &ModelConfig) -> Result<Arc<dyn TextModel>> {
    if config.model_id.trim().is_empty() {
        return Err(anyhow!("Model id must not be empty"));
    }

    let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
        warn!(
            "No API key for {} (set GEMINI_API_KEY, XAI_API_KEY or OPENAI_API_KEY)",
            config.provider.as_str()
        );
        return Ok(Arc::new(UnconfiguredModel {
            model: config.model_id.clone(),
            provider: config.provider,
        }));
    };

    let model: Arc<dyn TextModel> = match config.provider {
        ModelProvider::Gemini => Arc::new(match &config.base_url {
            Some(base) => GeminiClient::with_base_url(api_key, config.model_id.clone(), base.clone()),
            None => GeminiClient::new(api_key, config.model_id.clone()),
        }),
        ModelProvider::OpenAiCompatible => Arc::new(ChatCompletionsClient::new(
            api_key,
            config.model_id.clone(),
            config.base_url.clone(),
        )),
    };

    info!("Using {} model {}", config.provider.as_str(), model.model_id());
    Ok(model)
}

/// Stand-in used when no credentials are available
struct UnconfiguredModel {
    model: String,
    provider: ModelProvider,
}

#[async_trait]
impl TextModel for UnconfiguredModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured(format!(
            "no API key for {}",
            self.provider.as_str()
        )))
    }
}

/// Reject blank model output
pub(crate) fn non_empty(text: String) -> Result<String, ModelError> {
    if text.trim().is_empty() {
        Err(ModelError::Empty)
    } else {
        Ok(text)
    }
}

/// Map reqwest failures onto the model taxonomy
pub(crate) fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Transport(format!("request timed out: {}", e))
    } else {
        ModelError::Transport(e.to_string())
    }
}
