//! ============================================================================
//! Roast Orchestrator - One roast, start to finish
//! ============================================================================
//! Stages run strictly in order:
//!   ResolvingPrefs -> RenderingPrompt -> CallingModel -> RecordingOutcome
//!
//! Every invocation ends in RecordingOutcome and returns an OutcomeRecord.
//! Storage and model failures become `success = false` outcomes, never errors.
//! ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::model::{GenerationRequest, TextModel};
use crate::prompt::render_prompt;
use crate::store::{PreferenceStore, UsageLog};
use crate::types::{FileType, OutcomeRecord, PreferenceRecord, UsageEvent};

/// User id recorded for roasts run without a login
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoastStage {
    ResolvingPrefs,
    RenderingPrompt,
    CallingModel,
    RecordingOutcome,
}

impl RoastStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolvingPrefs => "resolving_prefs",
            Self::RenderingPrompt => "rendering_prompt",
            Self::CallingModel => "calling_model",
            Self::RecordingOutcome => "recording_outcome",
        }
    }
}

/// Generation limits applied to every model call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoastSettings {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl From<&ModelConfig> for RoastSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature.clamp(0.0, 1.0),
            timeout: config.timeout(),
        }
    }
}

impl Default for RoastSettings {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

pub struct RoastOrchestrator {
    preferences: PreferenceStore,
    usage: UsageLog,
    model: Arc<dyn TextModel>,
    settings: RoastSettings,
}

impl RoastOrchestrator {
    pub fn new(
        preferences: PreferenceStore,
        usage: UsageLog,
        model: Arc<dyn TextModel>,
        settings: RoastSettings,
    ) -> Self {
        Self {
            preferences,
            usage,
            model,
            settings,
        }
    }

    pub fn settings(&self) -> &RoastSettings {
        &self.settings
    }

    /// Roast `text` for `user_id` (or anonymously). Always returns an outcome.
    pub async fn roast(&self, user_id: Option<&str>, text: &str, file_type: FileType) -> OutcomeRecord {
        let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());

        // ====================================================================
        // ResolvingPrefs
        // ====================================================================
        debug!("[{}] user={:?}", RoastStage::ResolvingPrefs.as_str(), user_id);
        let prefs = match user_id {
            Some(id) => self.preferences.get(id).await,
            None => PreferenceRecord::default(),
        };

        // ====================================================================
        // RenderingPrompt + CallingModel
        // ====================================================================
        let (result, elapsed) = self.generate(prefs, text).await;

        let outcome = match result {
            Ok(roast) => {
                let chars = roast.chars().count() as u64;
                info!("Roast succeeded in {:.2}s ({} chars)", elapsed, chars);
                OutcomeRecord {
                    roast_text: roast,
                    processing_time_seconds: elapsed,
                    output_length_chars: chars,
                    success: true,
                    error: None,
                    model_id: self.model.model_id().to_string(),
                    roast_style: prefs.roast_style,
                    intensity: prefs.intensity,
                }
            }
            Err(reason) => {
                warn!("Roast failed after {:.2}s: {}", elapsed, reason);
                OutcomeRecord {
                    roast_text: format!("Roast failed: {}", reason),
                    processing_time_seconds: elapsed,
                    output_length_chars: 0,
                    success: false,
                    error: Some(reason),
                    model_id: self.model.model_id().to_string(),
                    roast_style: prefs.roast_style,
                    intensity: prefs.intensity,
                }
            }
        };

        // ====================================================================
        // RecordingOutcome
        // ====================================================================
        let recorded_as = user_id.unwrap_or(ANONYMOUS_USER);
        debug!("[{}] user={}", RoastStage::RecordingOutcome.as_str(), recorded_as);
        let event = UsageEvent::from_outcome(recorded_as, file_type, &outcome);
        self.usage.append(&event).await;

        outcome
    }

    /// Render and call the model. Elapsed seconds cover the model call only.
    async fn generate(&self, prefs: PreferenceRecord, text: &str) -> (Result<String, String>, f64) {
        debug!(
            "[{}] style={} intensity={}",
            RoastStage::RenderingPrompt.as_str(),
            prefs.roast_style,
            prefs.intensity
        );
        if text.trim().is_empty() {
            return (Err("no resume text to roast".to_string()), 0.0);
        }

        let request = GenerationRequest {
            prompt: render_prompt(prefs.roast_style, prefs.intensity, text),
            max_output_tokens: self.settings.max_output_tokens,
            temperature: self.settings.temperature,
        };

        debug!(
            "[{}] model={} timeout={:?}",
            RoastStage::CallingModel.as_str(),
            self.model.model_id(),
            self.settings.timeout
        );
        let started = Instant::now();
        let result = match tokio::time::timeout(self.settings.timeout, self.model.generate(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.settings.timeout)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        let result = result
            .and_then(|roast| {
                if roast.trim().is_empty() {
                    Err(ModelError::Empty)
                } else {
                    Ok(roast)
                }
            })
            .map_err(|e| e.to_string());

        (result, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryPreferences, MemoryUsage, ScriptedModel};
    use crate::types::{Intensity, RoastStyle};

    struct Harness {
        orchestrator: RoastOrchestrator,
        prefs: PreferenceStore,
        usage: UsageLog,
        usage_backend: Arc<MemoryUsage>,
        model: Arc<ScriptedModel>,
    }

    fn harness(model: ScriptedModel, settings: RoastSettings) -> Harness {
        let prefs = PreferenceStore::new(Arc::new(MemoryPreferences::default()));
        let usage_backend = Arc::new(MemoryUsage::default());
        let usage = UsageLog::new(usage_backend.clone());
        let model = Arc::new(model);
        let orchestrator = RoastOrchestrator::new(prefs.clone(), usage.clone(), model.clone(), settings);
        Harness {
            orchestrator,
            prefs,
            usage,
            usage_backend,
            model,
        }
    }

    #[tokio::test]
    async fn test_successful_roast_is_recorded() {
        let h = harness(ScriptedModel::replying("Nice résumé."), RoastSettings::default());

        let outcome = h.orchestrator.roast(Some("alice"), "Jane Doe, Excel wizard", FileType::Pdf).await;
        assert!(outcome.success);
        assert_eq!(outcome.roast_text, "Nice résumé.");
        assert_eq!(outcome.output_length_chars, 12);
        assert_eq!(outcome.model_id, "scripted");
        assert!(outcome.error.is_none());

        let events = h.usage.read_all("alice").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].file_type, FileType::Pdf);
        assert_eq!(events[0].output_length_chars, 12);
    }

    #[tokio::test]
    async fn test_uses_stored_preferences_and_settings() {
        let settings = RoastSettings {
            max_output_tokens: 123,
            temperature: 0.25,
            timeout: Duration::from_secs(5),
        };
        let h = harness(ScriptedModel::replying("ok"), settings);
        let savage = PreferenceRecord::new(RoastStyle::Savage, Intensity::High);
        assert!(h.prefs.set("alice", savage).await);

        let outcome = h.orchestrator.roast(Some("alice"), "resume text", FileType::Txt).await;
        assert_eq!(outcome.roast_style, RoastStyle::Savage);
        assert_eq!(outcome.intensity, Intensity::High);

        let request = h.model.last_request().unwrap();
        assert_eq!(request.prompt, render_prompt(RoastStyle::Savage, Intensity::High, "resume text"));
        assert_eq!(request.max_output_tokens, 123);
        assert_eq!(request.temperature, 0.25);
    }

    #[tokio::test]
    async fn test_anonymous_roast_uses_defaults() {
        let h = harness(ScriptedModel::replying("ok"), RoastSettings::default());

        let outcome = h.orchestrator.roast(None, "resume", FileType::Txt).await;
        assert_eq!(outcome.roast_style, RoastStyle::Balanced);
        assert_eq!(outcome.intensity, Intensity::Medium);
        assert_eq!(h.usage.read_all(ANONYMOUS_USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_error_becomes_failure_outcome() {
        let model = ScriptedModel::new(vec![Err(ModelError::Api {
            status: 503,
            body: "overloaded".into(),
        })]);
        let h = harness(model, RoastSettings::default());

        let outcome = h.orchestrator.roast(Some("bob"), "resume", FileType::Pdf).await;
        assert!(!outcome.success);
        assert_eq!(outcome.output_length_chars, 0);
        assert!(outcome.roast_text.starts_with("Roast failed:"));
        assert!(outcome.roast_text.contains("503"));

        let summary = h.usage.aggregate("bob").await;
        assert_eq!(summary.count, 1);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_empty_response_is_failure() {
        let h = harness(ScriptedModel::replying("   \n"), RoastSettings::default());

        let outcome = h.orchestrator.roast(Some("bob"), "resume", FileType::Txt).await;
        assert!(!outcome.success);
        assert!(outcome.roast_text.contains("No response from AI."));
        assert!(!h.usage.read_all("bob").await.unwrap()[0].success);
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let settings = RoastSettings {
            timeout: Duration::from_millis(20),
            ..RoastSettings::default()
        };
        let model = ScriptedModel::replying("too late").with_delay(Duration::from_millis(500));
        let h = harness(model, settings);

        let outcome = h.orchestrator.roast(Some("carol"), "resume", FileType::Txt).await;
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("timed out after 20ms"), "{}", error);
        assert_eq!(h.usage_backend.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_text_skips_model_but_is_recorded() {
        let h = harness(ScriptedModel::replying("unused"), RoastSettings::default());

        let outcome = h.orchestrator.roast(Some("dave"), "  \n ", FileType::Pdf).await;
        assert!(!outcome.success);
        assert_eq!(outcome.processing_time_seconds, 0.0);
        assert_eq!(h.model.calls(), 0);
        assert_eq!(h.usage.read_all("dave").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_failure_does_not_change_outcome() {
        let h = harness(ScriptedModel::replying("still roasted"), RoastSettings::default());
        h.usage_backend.set_failing(true);

        let outcome = h.orchestrator.roast(Some("erin"), "resume", FileType::Txt).await;
        assert!(outcome.success);
        assert_eq!(outcome.roast_text, "still roasted");
    }

    #[test]
    fn test_settings_from_config() {
        let config = ModelConfig {
            temperature: 1.7,
            timeout_secs: 9,
            ..ModelConfig::default()
        };
        let settings = RoastSettings::from(&config);
        assert_eq!(settings.temperature, 1.0);
        assert_eq!(settings.timeout, Duration::from_secs(9));
        assert_eq!(settings.max_output_tokens, 400);
    }
}
