//! The engine call contract.
//!
//! The vectorization engine is an opaque, pre-compiled compute module;
//! this trait is the only surface the control plane touches. `run` is
//! synchronous and may block for a long time without yielding, so it is
//! only ever invoked on the dedicated execution thread.

use std::sync::Arc;

use tracekit_core::config::EngineSettings;
use tracekit_core::types::{ImageDescriptor, VectorArtifact};

/// A raw, unclassified engine failure.
///
/// Carries the engine's own diagnostic string verbatim; classification
/// into categories happens later, controller-side.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct EngineCallError(pub String);

impl EngineCallError {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

/// In-call progress report, stamped with the job id by the execution
/// context before it reaches the wire.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: String,
    pub percent: f32,
    pub message: Option<String>,
}

/// One engine instance.
///
/// Methods take `&self` so the controller can invoke [`Self::destroy`]
/// from outside the execution thread while a wedged [`Self::run`] call is
/// still in flight. Implementations must make `destroy` safe to call
/// concurrently with `run` and idempotent.
pub trait VectorEngine: Send + Sync {
    /// Apply normalized settings. Must complete before `run` is called;
    /// never interleaved with it.
    fn configure(&self, settings: &EngineSettings) -> Result<(), EngineCallError>;

    /// Execute one vectorization. Opaque and possibly long-running; the
    /// only cooperation point is the progress callback.
    fn run(
        &self,
        image: &ImageDescriptor,
        on_progress: &dyn Fn(ProgressUpdate),
    ) -> Result<VectorArtifact, EngineCallError>;

    /// Release all native resources. Best-effort: callers log a failure
    /// and discard the instance either way.
    fn destroy(&self) -> Result<(), EngineCallError>;
}

/// Creates fresh engine instances.
///
/// Every job gets a fresh instance; a post-failure instance is never
/// trusted again, so there is no pooling behind this trait.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn VectorEngine>, EngineCallError>;
}
