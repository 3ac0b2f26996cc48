//! The dedicated execution context.
//!
//! One OS thread hosts the engine and serially drains a request channel;
//! the controller and callers live elsewhere and exchange only messages
//! with it. The engine call inside [`VectorEngine::run`] does not yield,
//! so this thread can be wedged for the whole duration of a job — which
//! is exactly why it gets a thread of its own and why forced teardown
//! goes through [`InstanceManager`] rather than through this loop.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracekit_core::config::{normalize, ConfigBag, EngineSettings};
use tracekit_core::types::JobId;

use crate::instance::InstanceManager;
use crate::messages::{EngineRequest, EngineResponse, SuccessData};
use crate::state::{EngineState, EngineStateMachine};
use crate::traits::VectorEngine;

/// Errors raised when talking to the context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The context's request channel is closed; the loop has exited.
    #[error("Execution context channel closed")]
    ChannelClosed,
}

/// Handle to the execution thread.
///
/// Requests go in through [`Self::send`]; all responses and progress
/// events come back on the receiver returned by [`Self::spawn`].
pub struct ExecutionContext {
    request_tx: mpsc::UnboundedSender<EngineRequest>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ExecutionContext {
    /// Start the execution thread.
    ///
    /// The caller keeps the returned response receiver; dropping it does
    /// not stop the thread (send a [`EngineRequest::Cleanup`] for that).
    pub fn spawn(
        instances: Arc<InstanceManager>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineResponse>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("engine-exec".to_string())
            .spawn(move || {
                ContextLoop {
                    state: EngineStateMachine::new(),
                    instances,
                    response_tx,
                    baseline: ConfigBag::default(),
                    aborted: HashSet::new(),
                }
                .run(request_rx);
            })
            .expect("failed to spawn execution thread");

        (
            Self {
                request_tx,
                thread: Some(thread),
            },
            response_rx,
        )
    }

    /// Queue a request for the execution thread.
    pub fn send(&self, request: EngineRequest) -> Result<(), ContextError> {
        self.request_tx
            .send(request)
            .map_err(|_| ContextError::ChannelClosed)
    }

    /// Wait for the execution thread to exit.
    ///
    /// Only meaningful after a `Cleanup` request; a wedged engine call
    /// keeps the thread alive until it returns or its instance is
    /// force-released.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// State owned by the execution thread.
struct ContextLoop {
    state: EngineStateMachine,
    instances: Arc<InstanceManager>,
    response_tx: mpsc::UnboundedSender<EngineResponse>,
    /// Baseline configuration, seeded by `Init` and overlaid by
    /// `Configure` deltas. Used by `Process` requests that carry no
    /// explicit settings.
    baseline: ConfigBag,
    /// Jobs aborted before their `Process` arrived. Purged whenever a
    /// `Process` is consumed: requests are FIFO and one job runs at a
    /// time, so older entries can never match a future job.
    aborted: HashSet<JobId>,
}

enum Flow {
    Continue,
    Stop,
}

impl ContextLoop {
    fn run(mut self, mut request_rx: mpsc::UnboundedReceiver<EngineRequest>) {
        tracing::info!("Execution context started");
        while let Some(request) = request_rx.blocking_recv() {
            if let Flow::Stop = self.handle(request) {
                break;
            }
        }
        tracing::info!("Execution context exited");
    }

    fn handle(&mut self, request: EngineRequest) -> Flow {
        let id = request.correlation_id();
        match request {
            EngineRequest::Init { config, .. } => {
                self.handle_init(id, config);
                Flow::Continue
            }
            EngineRequest::Configure { config_delta, .. } => {
                self.baseline.merge(&config_delta);
                self.respond_success(id, SuccessData::Configured);
                Flow::Continue
            }
            EngineRequest::Process {
                image, settings, ..
            } => {
                self.handle_process(id, &image, settings);
                Flow::Continue
            }
            EngineRequest::Abort { .. } => {
                self.aborted.insert(id);
                self.respond_success(id, SuccessData::Aborted);
                Flow::Continue
            }
            EngineRequest::Cleanup { .. } => {
                let _ = self.state.begin_terminating();
                if let Some(active) = self.instances.active_job() {
                    self.instances.release(active);
                }
                self.respond_success(id, SuccessData::CleanedUp);
                Flow::Stop
            }
        }
    }

    fn handle_init(&mut self, id: JobId, config: Option<ConfigBag>) {
        self.baseline = config.unwrap_or_default();
        let result = match self.state.state() {
            EngineState::Initializing => self.state.mark_ready(),
            EngineState::Error => self
                .state
                .reinitialize()
                .and_then(|_| self.state.mark_ready()),
            // Already serviceable; re-init is a no-op.
            EngineState::Ready | EngineState::Idle => Ok(()),
            _ => self.state.mark_ready(),
        };
        match result {
            Ok(()) => self.respond_success(id, SuccessData::Initialized),
            Err(e) => self.respond_error(id, e.to_string()),
        }
    }

    fn handle_process(
        &mut self,
        id: JobId,
        image: &tracekit_core::types::ImageDescriptor,
        settings: Option<EngineSettings>,
    ) {
        let cancelled = self.aborted.remove(&id);
        self.aborted.clear();
        if cancelled {
            self.respond_error(id, "cancelled before processing started".to_string());
            return;
        }
        let settings = match settings {
            Some(settings) => settings,
            None => match normalize(&self.baseline) {
                Ok(outcome) => outcome.settings,
                Err(rejection) => {
                    self.respond_error(id, format!("invalid config: {rejection}"));
                    return;
                }
            },
        };
        if let Err(e) = self.state.begin_processing() {
            self.respond_error(id, e.to_string());
            return;
        }

        let engine = match self.instances.acquire(id) {
            Ok(engine) => engine,
            Err(e) => {
                let _ = self.state.fail();
                self.respond_error(id, e.to_string());
                return;
            }
        };

        // Configuration is applied strictly before the processing call.
        if let Err(e) = engine.configure(&settings) {
            self.instances.release(id);
            let _ = self.state.fail();
            self.respond_error(id, e.to_string());
            return;
        }

        let outcome = self.run_engine(id, &engine, image);

        // Teardown before the terminal message, on every path.
        self.instances.release(id);

        match outcome {
            Ok(artifact) => {
                let _ = self.state.finish_processing();
                self.respond_success(id, SuccessData::Completed { artifact });
            }
            Err(raw) => {
                let _ = self.state.fail();
                tracing::warn!(job_id = %id, error = %raw, "Engine call failed");
                self.respond_error(id, raw);
            }
        }
    }

    fn run_engine(
        &self,
        id: JobId,
        engine: &Arc<dyn VectorEngine>,
        image: &tracekit_core::types::ImageDescriptor,
    ) -> Result<tracekit_core::types::VectorArtifact, String> {
        let progress_tx = self.response_tx.clone();
        let on_progress = move |update: crate::traits::ProgressUpdate| {
            // Dropped receivers just mean nobody is listening anymore.
            let _ = progress_tx.send(EngineResponse::Progress {
                id,
                stage: update.stage,
                percent: update.percent,
                message: update.message,
            });
        };
        engine.run(image, &on_progress).map_err(|e| e.to_string())
    }

    fn respond_success(&self, id: JobId, data: SuccessData) {
        let _ = self.response_tx.send(EngineResponse::Success { id, data });
    }

    fn respond_error(&self, id: JobId, message: String) {
        let _ = self.response_tx.send(EngineResponse::Error { id, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Script, ScriptedFactory};
    use assert_matches::assert_matches;
    use tracekit_core::config::EngineSettings;
    use tracekit_core::types::ImageDescriptor;

    fn image() -> ImageDescriptor {
        ImageDescriptor::new(vec![0; 16], 2, 2).unwrap()
    }

    fn settings() -> EngineSettings {
        EngineSettings::default_for(tracekit_core::config::Backend::Edge)
    }

    async fn recv_terminal(
        rx: &mut mpsc::UnboundedReceiver<EngineResponse>,
    ) -> EngineResponse {
        loop {
            let response = rx.recv().await.expect("context closed unexpectedly");
            if response.is_terminal() {
                return response;
            }
        }
    }

    #[tokio::test]
    async fn init_then_process_succeeds() {
        let factory = ScriptedFactory::new(Script::Succeed).with_progress(&[("edges", 50.0)]);
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (ctx, mut rx) = ExecutionContext::spawn(Arc::clone(&manager));

        let init_id = JobId::new();
        ctx.send(EngineRequest::Init {
            id: init_id,
            config: None,
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                id,
                data: SuccessData::Initialized
            } if id == init_id
        );

        let job = JobId::new();
        ctx.send(EngineRequest::Process {
            id: job,
            image: image(),
            settings: Some(settings()),
        })
        .unwrap();

        // Progress first, stamped with the job id.
        assert_matches!(
            rx.recv().await.unwrap(),
            EngineResponse::Progress { id, stage, .. } => {
                assert_eq!(id, job);
                assert_eq!(stage, "edges");
            }
        );
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                id,
                data: SuccessData::Completed { artifact }
            } => {
                assert_eq!(id, job);
                assert_eq!(artifact.width, 2);
            }
        );

        // Instance torn down before the terminal message was observed.
        assert_eq!(factory.counters().destroyed(), 1);
        assert!(manager.active_job().is_none());
    }

    #[tokio::test]
    async fn process_without_init_is_rejected() {
        let factory = ScriptedFactory::new(Script::Succeed);
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (ctx, mut rx) = ExecutionContext::spawn(manager);

        ctx.send(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: Some(settings()),
        })
        .unwrap();
        assert_matches!(recv_terminal(&mut rx).await, EngineResponse::Error { .. });
        assert_eq!(factory.counters().created(), 0);
    }

    #[tokio::test]
    async fn fault_poisons_the_context_until_reinit() {
        let factory = ScriptedFactory::new(Script::Fault("unreachable executed".into()));
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (ctx, mut rx) = ExecutionContext::spawn(manager);

        ctx.send(EngineRequest::Init {
            id: JobId::new(),
            config: None,
        })
        .unwrap();
        recv_terminal(&mut rx).await;

        // First job faults; the raw diagnostic survives.
        ctx.send(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: Some(settings()),
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Error { message, .. } => {
                assert_eq!(message, "unreachable executed");
            }
        );
        assert_eq!(factory.counters().destroyed(), 1);

        // Second job is rejected without touching a new instance.
        ctx.send(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: Some(settings()),
        })
        .unwrap();
        assert_matches!(recv_terminal(&mut rx).await, EngineResponse::Error { .. });
        assert_eq!(factory.counters().created(), 1);

        // Explicit re-init recovers the context.
        ctx.send(EngineRequest::Init {
            id: JobId::new(),
            config: None,
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                data: SuccessData::Initialized,
                ..
            }
        );
        ctx.send(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: Some(settings()),
        })
        .unwrap();
        assert_matches!(recv_terminal(&mut rx).await, EngineResponse::Error { .. });
        assert_eq!(factory.counters().created(), 2);
        assert_eq!(factory.counters().destroyed(), 2);
    }

    #[tokio::test]
    async fn abort_before_process_cancels_the_job() {
        let factory = ScriptedFactory::new(Script::Succeed);
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (ctx, mut rx) = ExecutionContext::spawn(manager);

        ctx.send(EngineRequest::Init {
            id: JobId::new(),
            config: None,
        })
        .unwrap();
        recv_terminal(&mut rx).await;

        let job = JobId::new();
        ctx.send(EngineRequest::Abort { id: job }).unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                data: SuccessData::Aborted,
                ..
            }
        );

        ctx.send(EngineRequest::Process {
            id: job,
            image: image(),
            settings: Some(settings()),
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Error { id, message } => {
                assert_eq!(id, job);
                assert!(message.contains("cancelled"));
            }
        );
        // The engine was never dispatched.
        assert_eq!(factory.counters().runs(), 0);
    }

    #[tokio::test]
    async fn baseline_and_deltas_shape_a_process_without_explicit_settings() {
        let factory = ScriptedFactory::new(Script::Succeed);
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (ctx, mut rx) = ExecutionContext::spawn(manager);

        ctx.send(EngineRequest::Init {
            id: JobId::new(),
            config: Some(ConfigBag {
                backend: Some(tracekit_core::config::Backend::Centerline),
                ..ConfigBag::default()
            }),
        })
        .unwrap();
        recv_terminal(&mut rx).await;

        ctx.send(EngineRequest::Configure {
            id: JobId::new(),
            config_delta: ConfigBag {
                detail: Some(0.9),
                ..ConfigBag::default()
            },
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                data: SuccessData::Configured,
                ..
            }
        );

        ctx.send(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: None,
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                data: SuccessData::Completed { .. },
                ..
            }
        );

        // The engine saw the normalized baseline, delta included.
        let seen = factory.configured_settings();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].backend_kind(),
            tracekit_core::config::Backend::Centerline
        );
        assert_eq!(seen[0].shared.detail, 0.9);
    }

    #[tokio::test]
    async fn fatally_invalid_baseline_fails_a_process_before_acquisition() {
        let factory = ScriptedFactory::new(Script::Succeed);
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (ctx, mut rx) = ExecutionContext::spawn(manager);

        ctx.send(EngineRequest::Init {
            id: JobId::new(),
            config: None,
        })
        .unwrap();
        recv_terminal(&mut rx).await;

        // dot_density is meaningless outside the dots backend.
        ctx.send(EngineRequest::Configure {
            id: JobId::new(),
            config_delta: ConfigBag {
                dot_density: Some(0.2),
                ..ConfigBag::default()
            },
        })
        .unwrap();
        recv_terminal(&mut rx).await;

        ctx.send(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: None,
        })
        .unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Error { message, .. } => {
                assert!(message.contains("invalid config"));
            }
        );
        assert_eq!(factory.counters().created(), 0);
    }

    #[test]
    fn stale_abort_entries_are_purged_when_a_process_is_consumed() {
        let factory = ScriptedFactory::new(Script::Succeed);
        let (response_tx, _response_rx) = mpsc::unbounded_channel();
        let mut ctx = ContextLoop {
            state: EngineStateMachine::new(),
            instances: Arc::new(InstanceManager::new(factory.clone_arc())),
            response_tx,
            baseline: ConfigBag::default(),
            aborted: HashSet::new(),
        };
        let _ = ctx.handle(EngineRequest::Init {
            id: JobId::new(),
            config: None,
        });
        // Abort for a job whose Process was already consumed upstream.
        let _ = ctx.handle(EngineRequest::Abort { id: JobId::new() });
        assert_eq!(ctx.aborted.len(), 1);

        let _ = ctx.handle(EngineRequest::Process {
            id: JobId::new(),
            image: image(),
            settings: Some(settings()),
        });
        assert!(ctx.aborted.is_empty());
    }

    #[tokio::test]
    async fn cleanup_stops_the_loop_and_releases_the_instance() {
        let factory = ScriptedFactory::new(Script::Succeed);
        let manager = Arc::new(InstanceManager::new(factory.clone_arc()));
        let (mut ctx, mut rx) = ExecutionContext::spawn(Arc::clone(&manager));

        ctx.send(EngineRequest::Cleanup { id: JobId::new() }).unwrap();
        assert_matches!(
            recv_terminal(&mut rx).await,
            EngineResponse::Success {
                data: SuccessData::CleanedUp,
                ..
            }
        );
        ctx.join();
        assert_matches!(
            ctx.send(EngineRequest::Abort { id: JobId::new() }),
            Err(ContextError::ChannelClosed)
        );
    }
}
