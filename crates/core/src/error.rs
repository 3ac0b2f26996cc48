//! Error taxonomy for the control plane.
//!
//! [`ErrorRecord`] is the single caller-facing failure shape: a typed
//! category, a human-readable message, the preserved raw signal, a
//! retryability verdict, and remediation suggestions. Records are built by
//! the classifier in [`crate::classify`] and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::config::Violation;

/// Internal errors raised by the pure core (validation, invariant breaks).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Classified failure category, ordered roughly by recoverability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The configuration was rejected before the engine was touched.
    /// Fully recoverable by correcting the input.
    InvalidConfig,
    /// The engine crashed internally (trap, unreachable, runtime fault).
    EngineFault,
    /// The engine ran out of memory or addressed out of bounds.
    /// Usually recoverable with a smaller input.
    ResourceExhaustion,
    /// The job's deadline expired before the engine settled.
    Timeout,
    /// The caller aborted the job. Not an error in the usual sense.
    Cancelled,
    /// The transport between controller and execution context failed.
    ProtocolError,
    /// Nothing matched. Deliberately not retryable to avoid false
    /// reassurance.
    UnknownError,
}

impl ErrorCategory {
    /// Stable string code used in messages and logs.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::InvalidConfig => "InvalidConfig",
            ErrorCategory::EngineFault => "EngineFault",
            ErrorCategory::ResourceExhaustion => "ResourceExhaustion",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Cancelled => "Cancelled",
            ErrorCategory::ProtocolError => "ProtocolError",
            ErrorCategory::UnknownError => "UnknownError",
        }
    }
}

/// Whether retrying the same job can be expected to help.
///
/// A plain bool cannot express the taxonomy: some faults are worth one
/// more attempt (`Maybe`), and cancellation has no retry semantics at all
/// (`NotApplicable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retryability {
    Yes,
    No,
    Maybe,
    NotApplicable,
}

// ---------------------------------------------------------------------------
// ErrorRecord
// ---------------------------------------------------------------------------

/// A classified job failure, attached to the job's terminal outcome.
///
/// `message` is the single human-readable summary shown to the end user;
/// `raw` preserves the original low-level signal verbatim so higher layers
/// can log full diagnostics without surfacing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCategory,
    pub message: String,
    pub raw: String,
    pub retryable: Retryability,
    pub suggestions: Vec<String>,
}

impl ErrorRecord {
    /// Record for a job whose deadline expired.
    ///
    /// Distinct from [`ErrorCategory::EngineFault`] so callers can offer
    /// "reduce settings" rather than "try again" guidance.
    pub fn timeout(deadline_ms: u64) -> Self {
        Self {
            code: ErrorCategory::Timeout,
            message: format!("Processing did not finish within {deadline_ms} ms"),
            raw: format!("deadline exceeded after {deadline_ms} ms"),
            retryable: Retryability::Yes,
            suggestions: vec![
                "Reduce detail or complexity settings".to_string(),
                "Try a smaller image".to_string(),
            ],
        }
    }

    /// Record for an explicitly aborted job.
    pub fn cancelled() -> Self {
        Self {
            code: ErrorCategory::Cancelled,
            message: "Processing was cancelled".to_string(),
            raw: "cancelled by caller".to_string(),
            retryable: Retryability::NotApplicable,
            suggestions: Vec::new(),
        }
    }

    /// Record for a configuration rejected during normalization.
    ///
    /// The suggestions list names every violated field so the caller can
    /// correct them in one pass.
    pub fn invalid_config(violations: &[Violation]) -> Self {
        let raw = violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            code: ErrorCategory::InvalidConfig,
            message: "Configuration was rejected".to_string(),
            raw,
            retryable: Retryability::Yes,
            suggestions: violations.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Record for a transport or serialization failure.
    pub fn protocol(raw: impl Into<String>) -> Self {
        Self {
            code: ErrorCategory::ProtocolError,
            message: "Communication with the engine failed".to_string(),
            raw: raw.into(),
            retryable: Retryability::Yes,
            suggestions: vec!["Retry; if the problem persists, reload".to_string()],
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
