//! Configuration normalization.
//!
//! Callers supply a loosely-typed [`ConfigBag`]; [`normalize`] turns it into
//! backend-specific [`EngineSettings`] plus a list of [`Violation`]s, or
//! rejects it outright when fatally incompatible options are present.
//!
//! Normalization is a pure, deterministic function of its input: no I/O,
//! no side effects, and idempotent over its own output.

mod bag;
mod bounds;
mod normalize;
mod rules;
mod settings;

pub use bag::ConfigBag;
pub use normalize::normalize;
pub use settings::{
    BackendSettings, CenterlineSettings, DotsSettings, EdgeSettings, EngineSettings,
    SharedSettings, SuperpixelSettings,
};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// The engine's tracing backends. Each produces a different artistic style
/// and accepts a different slice of the parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Canny-style edge tracing producing stroked outlines.
    Edge,
    /// Skeleton tracing for technical line work.
    Centerline,
    /// SLIC region segmentation producing filled cells.
    Superpixel,
    /// Stippling / pointillism.
    Dots,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Edge => "edge",
            Backend::Centerline => "centerline",
            Backend::Superpixel => "superpixel",
            Backend::Dots => "dots",
        }
    }

    /// Backends that draw line work (and therefore accept the hand-drawn
    /// and line-color parameter groups).
    pub fn is_line_backend(self) -> bool {
        matches!(self, Backend::Edge | Backend::Centerline)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hand-drawn aesthetic presets for the line backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandDrawnPreset {
    #[default]
    None,
    Subtle,
    Medium,
    Strong,
    Sketchy,
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// What the normalizer did about a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A numeric value was out of bounds and pulled to the nearest bound.
    /// Non-fatal.
    Clamped,
    /// A dependent feature was enabled without its prerequisite; the
    /// prerequisite was force-enabled. Non-fatal.
    AutoFixed,
    /// A supplied option is meaningless for the selected backend. Fatal.
    Incompatible,
}

/// A single normalization finding. Never silently dropped: every change
/// the normalizer makes to caller-supplied input is recorded as one of
/// these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub kind: ViolationKind,
    pub detail: String,
}

impl Violation {
    pub fn new(field: &'static str, kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            detail: detail.into(),
        }
    }

    pub fn clamped(field: &'static str, from: f64, to: f64) -> Self {
        Self::new(field, ViolationKind::Clamped, format!("{from} clamped to {to}"))
    }

    pub fn auto_fixed(field: &'static str, detail: impl Into<String>) -> Self {
        Self::new(field, ViolationKind::AutoFixed, detail)
    }

    pub fn incompatible(field: &'static str, backend: Backend) -> Self {
        Self::new(
            field,
            ViolationKind::Incompatible,
            format!("not supported by the {backend} backend"),
        )
    }

    /// Fatal violations abort normalization.
    pub fn is_fatal(&self) -> bool {
        self.kind == ViolationKind::Incompatible
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.detail)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Successful normalization: engine-ready settings plus the non-fatal
/// findings recorded along the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizeOutcome {
    pub settings: EngineSettings,
    pub violations: Vec<Violation>,
}

/// Fatal rejection: carries the complete violation list (fatal and
/// non-fatal) so the caller can correct everything in one pass.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Configuration rejected with {} violation(s)", violations.len())]
pub struct ConfigRejection {
    pub violations: Vec<Violation>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
