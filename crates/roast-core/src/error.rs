//! ============================================================================
//! Errors - Failure taxonomy for stores and the model boundary
//! ============================================================================
//! Backend and SDK failures are translated into these types where they occur,
//! so pipeline code never inspects raw reqwest/redb/csv errors.
//! ============================================================================

use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Failure from any credential, preference, or usage backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Malformed or empty user input (username, password)
    #[error("Validation: {0}")]
    Validation(String),

    /// Identifier could not be normalized into the backend's canonical form
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// I/O, network, or permission failure talking to the backend
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The backend returned a payload we could not decode
    #[error("Corrupt payload: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Build a mapper that wraps any displayable error as `Unavailable`.
    pub(crate) fn unavailable<E: Display>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Unavailable(format!("{}: {}", context, e))
    }

    /// Build a mapper that wraps any displayable error as `Corrupt`.
    pub(crate) fn corrupt<E: Display>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Corrupt(format!("{}: {}", context, e))
    }
}

/// Failure from the generative-text collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to reach model API: {0}")]
    Transport(String),

    #[error("model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("prompt was blocked by the model: {0}")]
    Blocked(String),

    #[error("No response from AI.")]
    Empty,

    #[error("model not configured: {0}")]
    NotConfigured(String),
}

/// Unknown value when parsing one of the small string enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}
