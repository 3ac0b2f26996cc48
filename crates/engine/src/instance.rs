//! Per-job engine instance lifecycle.
//!
//! [`InstanceManager`] owns creation and guaranteed teardown of exactly
//! one live engine instance at a time. The single most important property
//! here is that `destroy` runs exactly once per instance no matter which
//! path settles the job: normal completion on the execution thread, or a
//! forced release from the controller after a timeout or abort. A
//! corrupted instance surviving into the next job is the dominant source
//! of every-other-job failures.

use std::sync::{Arc, Mutex};

use tracekit_core::types::JobId;

use crate::traits::{EngineFactory, VectorEngine};

/// Errors raised while acquiring an instance.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// An instance is already held. The single-job invariant forbids a
    /// second acquisition on the same manager.
    #[error("Engine instance already held by job {0}")]
    Busy(JobId),

    /// The factory failed to produce an instance.
    #[error("Engine instance creation failed: {0}")]
    CreateFailed(String),
}

struct ActiveInstance {
    job_id: JobId,
    engine: Arc<dyn VectorEngine>,
}

/// Owns the at-most-one live engine instance.
///
/// Shared between the execution thread (acquire/release on the normal
/// path) and the controller (force-release when the thread is wedged).
/// The mutex guards only the bookkeeping; `destroy` itself runs outside
/// the critical section.
pub struct InstanceManager {
    factory: Arc<dyn EngineFactory>,
    active: Mutex<Option<ActiveInstance>>,
}

impl InstanceManager {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            active: Mutex::new(None),
        }
    }

    /// Create a fresh instance for `job_id` and register it as active.
    ///
    /// Always creates anew; instances are never reused across jobs or
    /// configurations.
    pub fn acquire(&self, job_id: JobId) -> Result<Arc<dyn VectorEngine>, InstanceError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(held) = active.as_ref() {
            return Err(InstanceError::Busy(held.job_id));
        }
        let engine = self
            .factory
            .create()
            .map_err(|e| InstanceError::CreateFailed(e.to_string()))?;
        *active = Some(ActiveInstance {
            job_id,
            engine: Arc::clone(&engine),
        });
        tracing::debug!(%job_id, "Engine instance acquired");
        Ok(engine)
    }

    /// Destroy and forget the instance held by `job_id`.
    ///
    /// Idempotent: if the instance was already released (by the other
    /// side of a timeout race, or a repeated call) this is a no-op, which
    /// is what makes the exactly-once destroy guarantee hold.
    pub fn release(&self, job_id: JobId) {
        let taken = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            match active.as_ref() {
                Some(held) if held.job_id == job_id => active.take(),
                _ => None,
            }
        };
        if let Some(instance) = taken {
            destroy_logged(job_id, &instance.engine);
        }
    }

    /// Release from the controller side while the execution thread may be
    /// wedged inside the engine call.
    ///
    /// Same exactly-once semantics as [`Self::release`]; the forced path
    /// is logged at a higher level because it only happens on timeouts
    /// and aborts.
    pub fn force_release(&self, job_id: JobId) {
        let taken = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            match active.as_ref() {
                Some(held) if held.job_id == job_id => active.take(),
                _ => None,
            }
        };
        if let Some(instance) = taken {
            tracing::warn!(%job_id, "Force-releasing engine instance");
            destroy_logged(job_id, &instance.engine);
        }
    }

    /// The job currently holding the instance, if any.
    pub fn active_job(&self) -> Option<JobId> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|held| held.job_id)
    }
}

/// Best-effort destroy: a failing teardown call is logged and swallowed,
/// and the reference is discarded regardless. The next job creates a
/// fresh instance rather than trusting a half-destroyed one.
fn destroy_logged(job_id: JobId, engine: &Arc<dyn VectorEngine>) {
    if let Err(e) = engine.destroy() {
        tracing::warn!(%job_id, error = %e, "Engine destroy failed; discarding instance anyway");
    } else {
        tracing::debug!(%job_id, "Engine instance destroyed");
    }
}
