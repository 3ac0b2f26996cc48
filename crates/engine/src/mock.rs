//! Scripted engine implementation for tests.
//!
//! [`ScriptedFactory`] produces engines whose behavior is fixed up front:
//! succeed, fault with a given diagnostic, run slowly, or hang until
//! destroyed. Shared counters let tests assert on lifecycle invariants
//! (instances created, destroy called exactly once, and so on).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracekit_core::config::EngineSettings;
use tracekit_core::types::{ImageDescriptor, VectorArtifact};

use crate::traits::{EngineCallError, EngineFactory, ProgressUpdate, VectorEngine};

/// What a scripted engine does when `run` is called.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return a small artifact immediately.
    Succeed,
    /// Fail with the given raw diagnostic string.
    Fault(String),
    /// Sleep, then succeed. For exercising deadline margins.
    Slow(Duration),
    /// Never return on its own. The call unblocks only when `destroy`
    /// fires, then fails with a termination diagnostic — the behavior of
    /// a native call whose instance is torn down underneath it.
    Hang,
}

/// Lifecycle counters shared across every engine a factory creates.
#[derive(Debug, Default)]
pub struct Counters {
    created: AtomicUsize,
    configured: AtomicUsize,
    runs: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Factory producing [`ScriptedEngine`]s that all share one [`Counters`].
#[derive(Clone)]
pub struct ScriptedFactory {
    script: Script,
    progress: Vec<ProgressUpdate>,
    fail_create: bool,
    fail_configure: bool,
    fail_destroy: bool,
    counters: Arc<Counters>,
    configured_with: Arc<Mutex<Vec<EngineSettings>>>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            progress: Vec::new(),
            fail_create: false,
            fail_configure: false,
            fail_destroy: false,
            counters: Arc::new(Counters::default()),
            configured_with: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Emit these progress updates before the scripted outcome.
    pub fn with_progress(mut self, stages: &[(&str, f32)]) -> Self {
        self.progress = stages
            .iter()
            .map(|(stage, percent)| ProgressUpdate {
                stage: (*stage).to_string(),
                percent: *percent,
                message: None,
            })
            .collect();
        self
    }

    pub fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn with_failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Every settings value passed to `configure`, across all instances,
    /// in call order.
    pub fn configured_settings(&self) -> Vec<EngineSettings> {
        self.configured_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Convenience: this factory as the trait object the manager wants.
    pub fn clone_arc(&self) -> Arc<dyn EngineFactory> {
        Arc::new(self.clone())
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self) -> Result<Arc<dyn VectorEngine>, EngineCallError> {
        if self.fail_create {
            return Err(EngineCallError::new("allocation failed: no memory for engine"));
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            script: self.script.clone(),
            progress: self.progress.clone(),
            fail_configure: self.fail_configure,
            fail_destroy: self.fail_destroy,
            counters: Arc::clone(&self.counters),
            configured_with: Arc::clone(&self.configured_with),
            teardown: Teardown::default(),
        }))
    }
}

#[derive(Default)]
struct Teardown {
    destroyed: Mutex<bool>,
    signal: Condvar,
}

/// One scripted engine instance. See [`Script`] for behaviors.
pub struct ScriptedEngine {
    script: Script,
    progress: Vec<ProgressUpdate>,
    fail_configure: bool,
    fail_destroy: bool,
    counters: Arc<Counters>,
    configured_with: Arc<Mutex<Vec<EngineSettings>>>,
    teardown: Teardown,
}

impl ScriptedEngine {
    fn artifact(image: &ImageDescriptor) -> VectorArtifact {
        VectorArtifact {
            svg: format!(
                r#"<svg viewBox="0 0 {} {}"><path d="M0 0"/></svg>"#,
                image.width, image.height
            ),
            width: image.width,
            height: image.height,
            path_count: 1,
        }
    }
}

impl VectorEngine for ScriptedEngine {
    fn configure(&self, settings: &EngineSettings) -> Result<(), EngineCallError> {
        if self.fail_configure {
            return Err(EngineCallError::new("invalid config: rejected by engine"));
        }
        self.counters.configured.fetch_add(1, Ordering::SeqCst);
        self.configured_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(settings.clone());
        Ok(())
    }

    fn run(
        &self,
        image: &ImageDescriptor,
        on_progress: &dyn Fn(ProgressUpdate),
    ) -> Result<VectorArtifact, EngineCallError> {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
        for update in &self.progress {
            on_progress(update.clone());
        }
        match &self.script {
            Script::Succeed => Ok(Self::artifact(image)),
            Script::Fault(raw) => Err(EngineCallError::new(raw.clone())),
            Script::Slow(duration) => {
                std::thread::sleep(*duration);
                Ok(Self::artifact(image))
            }
            Script::Hang => {
                let mut destroyed = self
                    .teardown
                    .destroyed
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                while !*destroyed {
                    destroyed = self
                        .teardown
                        .signal
                        .wait(destroyed)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Err(EngineCallError::new(
                    "aborted: instance destroyed while call was in flight",
                ))
            }
        }
    }

    fn destroy(&self) -> Result<(), EngineCallError> {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        let mut destroyed = self
            .teardown
            .destroyed
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *destroyed = true;
        self.teardown.signal.notify_all();
        if self.fail_destroy {
            return Err(EngineCallError::new("destroy failed: resources leaked"));
        }
        Ok(())
    }
}
