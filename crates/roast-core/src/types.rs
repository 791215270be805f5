//! ============================================================================
//! Core Types for Resume Roast
//! ============================================================================
//! Fixed-shape records for preferences, usage events, and roast outcomes.
//! Enum fields keep preference comparisons exact after a round trip through
//! any backend.
//! ============================================================================

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// How harsh the roast should read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoastStyle {
    Gentle,
    #[default]
    Balanced,
    Savage,
}

impl RoastStyle {
    pub const ALL: [RoastStyle; 3] = [RoastStyle::Gentle, RoastStyle::Balanced, RoastStyle::Savage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gentle => "gentle",
            Self::Balanced => "balanced",
            Self::Savage => "savage",
        }
    }
}

impl FromStr for RoastStyle {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gentle" => Ok(Self::Gentle),
            "balanced" => Ok(Self::Balanced),
            "savage" => Ok(Self::Savage),
            _ => Err(ParseError {
                kind: "roast style",
                value: s.to_string(),
                expected: "gentle, balanced, savage",
            }),
        }
    }
}

impl fmt::Display for RoastStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the resume gets picked apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    #[default]
    Medium,
    High,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Low, Intensity::Medium, Intensity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Intensity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseError {
                kind: "intensity",
                value: s.to_string(),
                expected: "low, medium, high",
            }),
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's saved roast settings.
/// `Default` is the record every unknown user resolves to: balanced / medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub roast_style: RoastStyle,
    pub intensity: Intensity,
}

impl PreferenceRecord {
    pub fn new(roast_style: RoastStyle, intensity: Intensity) -> Self {
        Self { roast_style, intensity }
    }
}

/// Kind of document the roast text was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
    #[default]
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Unknown => "unknown",
        }
    }

    /// Map a declared type tag (extension or MIME type) to a file type.
    pub fn from_declared(declared: &str) -> Self {
        match declared.trim().trim_start_matches('.').to_lowercase().as_str() {
            "pdf" | "application/pdf" => Self::Pdf,
            "txt" | "text" | "text/plain" => Self::Txt,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one roast invocation, success or failure.
/// Returned to the caller and folded into a [`UsageEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// The roast on success, a user-safe error message on failure
    pub roast_text: String,
    /// Wall-clock seconds spent in the model call
    pub processing_time_seconds: f64,
    /// Character count of the roast (0 on failure)
    pub output_length_chars: u64,
    pub success: bool,
    /// Failure reason, if any
    pub error: Option<String>,
    pub model_id: String,
    pub roast_style: RoastStyle,
    pub intensity: Intensity,
}

/// One append-only usage log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub user_id: String,
    pub file_type: FileType,
    pub processing_time_seconds: f64,
    pub output_length_chars: u64,
    pub success: bool,
    /// RFC 3339 timestamp in UTC
    pub timestamp: String,
}

impl UsageEvent {
    /// Build the log entry for an outcome, stamped with the current time.
    pub fn from_outcome(user_id: &str, file_type: FileType, outcome: &OutcomeRecord) -> Self {
        Self {
            user_id: user_id.to_string(),
            file_type,
            processing_time_seconds: outcome.processing_time_seconds.max(0.0),
            output_length_chars: outcome.output_length_chars,
            success: outcome.success,
            timestamp: now_timestamp(),
        }
    }
}

/// Aggregate over a user's usage events
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub count: usize,
    /// Fraction of successful roasts in [0, 1]
    pub success_rate: f64,
    /// Mean model latency in seconds
    pub mean_processing_time: f64,
}

impl UsageSummary {
    /// Summarize a slice of events. An empty slice gives the all-zero summary.
    pub fn from_events(events: &[UsageEvent]) -> Self {
        if events.is_empty() {
            return Self::default();
        }

        let count = events.len();
        let successes = events.iter().filter(|e| e.success).count();
        let total_time: f64 = events.iter().map(|e| e.processing_time_seconds).sum();

        Self {
            count,
            success_rate: successes as f64 / count as f64,
            mean_processing_time: total_time / count as f64,
        }
    }
}

/// Current UTC time as an RFC 3339 string with millisecond precision
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
