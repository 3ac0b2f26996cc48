//! Shared domain types for the control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

// ---------------------------------------------------------------------------
// Job identity
// ---------------------------------------------------------------------------

/// Opaque correlation identifier linking a job's requests, responses, and
/// progress events. Generated by the controller, unique per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(uuid::Uuid);

impl JobId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Image input
// ---------------------------------------------------------------------------

/// Maximum supported width or height in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Maximum supported total pixel count (~32 MP, the engine's practical
/// memory ceiling).
pub const MAX_IMAGE_PIXELS: u64 = 32_000_000;

/// A decoded raster image handed to the engine. RGBA8, row-major.
///
/// The pixel buffer is opaque to the control plane; only the dimensions
/// participate in validation and deadline tiering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageDescriptor {
    /// Construct a descriptor, validating dimensions against the engine's
    /// documented limits.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self, CoreError> {
        validate_dimensions(width, height)?;
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Total number of pixels, used for deadline size tiering.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Validate image dimensions against the engine's documented limits.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), CoreError> {
    if width == 0 || height == 0 {
        return Err(CoreError::Validation(format!(
            "Image dimensions must be non-zero, got {width}x{height}"
        )));
    }
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(CoreError::Validation(format!(
            "Image dimensions {width}x{height} exceed the {MAX_IMAGE_DIMENSION} pixel per-side limit"
        )));
    }
    let total = width as u64 * height as u64;
    if total > MAX_IMAGE_PIXELS {
        return Err(CoreError::Validation(format!(
            "Image {width}x{height} ({total} pixels) exceeds the {MAX_IMAGE_PIXELS} pixel limit"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

/// Lifecycle status of a single vectorization job.
///
/// Transitions are monotonic: once a terminal status is reached the job
/// never changes again, and in particular never re-enters `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Normalizing,
    Acquiring,
    Running,
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
}

impl JobStatus {
    /// Whether this status is terminal (absorbing).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Aborted | JobStatus::TimedOut
        )
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Non-terminal statuses advance strictly forward through the pipeline;
    /// any non-terminal status may jump straight to a terminal one (a job
    /// can fail or be aborted at any stage).
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to.is_terminal() {
            return true;
        }
        matches!(
            (self, to),
            (JobStatus::Queued, JobStatus::Normalizing)
                | (JobStatus::Normalizing, JobStatus::Acquiring)
                | (JobStatus::Acquiring, JobStatus::Running)
        )
    }
}

// ---------------------------------------------------------------------------
// Progress and results
// ---------------------------------------------------------------------------

/// A point-in-time progress report for a running job.
///
/// Ephemeral: consumed for caller feedback only, never persisted, and may
/// be dropped under backpressure. Terminal outcomes never travel as
/// progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// Engine-defined stage name (e.g. `"edge_detection"`, `"svg_emission"`).
    pub stage: String,
    /// Completion in `0.0..=100.0`.
    pub percent: f32,
    pub message: Option<String>,
}

/// The engine's output for a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorArtifact {
    /// The generated SVG document.
    pub svg: String,
    pub width: u32,
    pub height: u32,
    /// Number of path elements emitted, for diagnostics and stats.
    pub path_count: u32,
}

/// Per-job performance statistics reported alongside a successful result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStats {
    /// Wall-clock duration from engine dispatch to settlement.
    pub duration_ms: u64,
    /// The effective deadline that was racing the job.
    pub deadline_ms: u64,
    /// Number of non-fatal normalization violations recorded for the job.
    pub violation_count: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
