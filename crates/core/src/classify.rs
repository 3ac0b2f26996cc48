//! Raw engine failure classification.
//!
//! The engine surfaces failures as opaque strings (wasm traps, runtime
//! exceptions, transport errors). [`classify`] maps them onto the typed
//! [`ErrorRecord`] taxonomy so callers get an actionable category instead
//! of an unintelligible fault. The original signal is always preserved in
//! [`ErrorRecord::raw`].

use crate::error::{ErrorCategory, ErrorRecord, Retryability};

/// One row of the classification table: substring needles, the resulting
/// category, retryability, the user-facing summary, and suggestions.
struct Rule {
    needles: &'static [&'static str],
    category: ErrorCategory,
    retryable: Retryability,
    message: &'static str,
    suggestions: &'static [&'static str],
}

/// Ordered classification table. First match wins, so more specific
/// signals must precede generic ones (e.g. `unreachable` before
/// `runtime error`).
const RULES: &[Rule] = &[
    Rule {
        needles: &["unreachable", "trap"],
        category: ErrorCategory::EngineFault,
        retryable: Retryability::No,
        message: "The engine hit an internal fault",
        suggestions: &["Try a different backend or a smaller image"],
    },
    Rule {
        needles: &["out of bounds", "memory access", "allocation failed", "out of memory"],
        category: ErrorCategory::ResourceExhaustion,
        retryable: Retryability::Yes,
        message: "The engine ran out of memory",
        suggestions: &["Reduce the image size"],
    },
    Rule {
        needles: &["runtime error", "runtimeerror"],
        category: ErrorCategory::EngineFault,
        retryable: Retryability::Maybe,
        message: "The engine reported a runtime fault",
        suggestions: &["Refresh and retry"],
    },
    Rule {
        needles: &["deadline exceeded", "timed out", "timeout"],
        category: ErrorCategory::Timeout,
        retryable: Retryability::Yes,
        message: "Processing ran out of time",
        suggestions: &["Reduce detail or complexity settings"],
    },
    Rule {
        needles: &["cancelled", "canceled", "aborted"],
        category: ErrorCategory::Cancelled,
        retryable: Retryability::NotApplicable,
        message: "Processing was cancelled",
        suggestions: &[],
    },
    Rule {
        needles: &["invalid config", "invalid parameter", "validation failed"],
        category: ErrorCategory::InvalidConfig,
        retryable: Retryability::Yes,
        message: "Configuration was rejected",
        suggestions: &["Correct the rejected settings and resubmit"],
    },
    Rule {
        needles: &["serialize", "deserialize", "channel closed", "malformed message"],
        category: ErrorCategory::ProtocolError,
        retryable: Retryability::Yes,
        message: "Communication with the engine failed",
        suggestions: &["Retry; if the problem persists, reload"],
    },
];

/// Classify a raw failure signal into a typed [`ErrorRecord`].
///
/// Matching is case-insensitive substring search against the ordered
/// taxonomy table; unmatched signals fall back to
/// [`ErrorCategory::UnknownError`] with `retryable = No` so callers are
/// never falsely reassured.
pub fn classify(raw: &str) -> ErrorRecord {
    let haystack = raw.to_lowercase();
    for rule in RULES {
        if rule.needles.iter().any(|n| haystack.contains(n)) {
            return ErrorRecord {
                code: rule.category,
                message: rule.message.to_string(),
                raw: raw.to_string(),
                retryable: rule.retryable,
                suggestions: rule.suggestions.iter().map(|s| s.to_string()).collect(),
            };
        }
    }
    ErrorRecord {
        code: ErrorCategory::UnknownError,
        message: "Processing failed for an unknown reason".to_string(),
        raw: raw.to_string(),
        retryable: Retryability::No,
        suggestions: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_trap_is_engine_fault_not_retryable() {
        let rec = classify("RuntimeError: unreachable executed");
        assert_eq!(rec.code, ErrorCategory::EngineFault);
        assert_eq!(rec.retryable, Retryability::No);
        assert!(rec.suggestions[0].contains("different backend"));
    }

    #[test]
    fn trap_matches_engine_fault() {
        let rec = classify("wasm trap: call stack exhausted");
        assert_eq!(rec.code, ErrorCategory::EngineFault);
    }

    #[test]
    fn out_of_bounds_is_resource_exhaustion() {
        let rec = classify("memory access out of bounds");
        assert_eq!(rec.code, ErrorCategory::ResourceExhaustion);
        assert_eq!(rec.retryable, Retryability::Yes);
        assert!(rec.suggestions[0].to_lowercase().contains("image size"));
    }

    #[test]
    fn generic_runtime_error_is_maybe_retryable_fault() {
        let rec = classify("RuntimeError: something odd happened");
        // "unreachable" did not match, so the generic runtime rule applies.
        assert_eq!(rec.code, ErrorCategory::EngineFault);
        assert_eq!(rec.retryable, Retryability::Maybe);
    }

    #[test]
    fn deadline_signal_is_timeout() {
        let rec = classify("deadline exceeded after 30000 ms");
        assert_eq!(rec.code, ErrorCategory::Timeout);
        assert_eq!(rec.retryable, Retryability::Yes);
    }

    #[test]
    fn cancellation_signal_is_cancelled() {
        let rec = classify("operation cancelled by user");
        assert_eq!(rec.code, ErrorCategory::Cancelled);
        assert_eq!(rec.retryable, Retryability::NotApplicable);
    }

    #[test]
    fn validation_signal_is_invalid_config() {
        let rec = classify("Validation failed: pass_count must be between 1 and 10");
        assert_eq!(rec.code, ErrorCategory::InvalidConfig);
    }

    #[test]
    fn transport_signal_is_protocol_error() {
        let rec = classify("failed to deserialize response payload");
        assert_eq!(rec.code, ErrorCategory::ProtocolError);
        assert_eq!(rec.retryable, Retryability::Yes);
    }

    #[test]
    fn channel_closed_is_protocol_error() {
        let rec = classify("request channel closed");
        assert_eq!(rec.code, ErrorCategory::ProtocolError);
    }

    #[test]
    fn unknown_signal_falls_back_not_retryable() {
        let rec = classify("gremlins in the pipeline");
        assert_eq!(rec.code, ErrorCategory::UnknownError);
        assert_eq!(rec.retryable, Retryability::No);
    }

    #[test]
    fn raw_signal_is_always_preserved() {
        let raw = "RuntimeError: unreachable executed at wasm offset 0x1f3a";
        let rec = classify(raw);
        assert_eq!(rec.raw, raw);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rec = classify("MEMORY ACCESS OUT OF BOUNDS");
        assert_eq!(rec.code, ErrorCategory::ResourceExhaustion);
    }

    #[test]
    fn specificity_order_unreachable_beats_runtime_error() {
        // Contains both needles; the more specific rule is listed first.
        let rec = classify("RuntimeError: unreachable");
        assert_eq!(rec.retryable, Retryability::No);
    }
}
