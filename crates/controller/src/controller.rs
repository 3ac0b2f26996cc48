//! Per-job orchestration.
//!
//! [`JobController`] composes the whole pipeline: normalize the raw bag
//! (fail fast on fatal violations, before any engine work), ensure the
//! execution context is serviceable, dispatch the engine call, race it
//! against the effective deadline and the abort token while relaying
//! progress, classify the outcome, and guarantee instance teardown before
//! the terminal result is emitted.
//!
//! One job at a time: a second `submit` while one is in flight is
//! rejected with [`SubmitError::Busy`]. Queueing is the caller's concern.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracekit_core::classify;
use tracekit_core::config::{normalize, ConfigBag};
use tracekit_core::error::{ErrorCategory, ErrorRecord};
use tracekit_core::types::{
    ImageDescriptor, JobId, JobStats, JobStatus, ProgressEvent, VectorArtifact,
};
use tracekit_engine::context::ExecutionContext;
use tracekit_engine::instance::InstanceManager;
use tracekit_engine::messages::{EngineRequest, EngineResponse, SuccessData};
use tracekit_engine::traits::EngineFactory;

use crate::deadline::DeadlinePolicy;
use crate::events::{JobEvent, JobEventBus};

/// How long shutdown waits for the execution context to acknowledge
/// cleanup.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One vectorization request, as the controller tracks it.
///
/// Owned by `submit` and passed through every step; there is no ambient
/// "current job" state anywhere. The input image and raw config are not
/// stored here — ownership of both moves into the `Process` message.
struct Job {
    id: JobId,
    status: JobStatus,
    deadline_ms: u64,
    violation_count: usize,
    started_at: DateTime<Utc>,
}

impl Job {
    fn new() -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            deadline_ms: 0,
            violation_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Advance the status, enforcing monotonic transitions.
    fn advance(&mut self, to: JobStatus) {
        if self.status.can_transition_to(to) {
            self.status = to;
        } else {
            // A terminal status is never left; reaching this is a logic bug.
            tracing::error!(job_id = %self.id, from = ?self.status, ?to, "Illegal job status transition");
        }
    }
}

/// A successfully completed job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub artifact: VectorArtifact,
    pub stats: JobStats,
}

/// Why `submit` did not return an artifact.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// A job is already in flight on this controller.
    #[error("Another job is already in flight")]
    Busy,

    /// The job settled without an artifact; the record carries the
    /// classified category, retryability, and suggestions.
    #[error("{0}")]
    Failed(ErrorRecord),
}

impl SubmitError {
    pub fn record(&self) -> Option<&ErrorRecord> {
        match self {
            SubmitError::Busy => None,
            SubmitError::Failed(record) => Some(record),
        }
    }
}

/// Drives one execution context, one job at a time.
pub struct JobController {
    context: ExecutionContext,
    instances: Arc<InstanceManager>,
    events: Arc<JobEventBus>,
    policy: DeadlinePolicy,
    /// Response receiver, locked for the duration of one job. Doubles as
    /// the single-flight gate: `try_lock` failure means busy.
    responses: tokio::sync::Mutex<mpsc::UnboundedReceiver<EngineResponse>>,
    /// Whether the context needs (re-)initialization before the next job.
    /// Set after faults, timeouts, and aborts.
    needs_init: AtomicBool,
    /// The in-flight job and its abort token.
    current: Mutex<Option<(JobId, CancellationToken)>>,
}

impl JobController {
    pub fn new(factory: Arc<dyn EngineFactory>, policy: DeadlinePolicy) -> Self {
        let instances = Arc::new(InstanceManager::new(factory));
        let (context, responses) = ExecutionContext::spawn(Arc::clone(&instances));
        Self {
            context,
            instances,
            events: Arc::new(JobEventBus::default()),
            policy,
            responses: tokio::sync::Mutex::new(responses),
            needs_init: AtomicBool::new(true),
            current: Mutex::new(None),
        }
    }

    /// Subscribe to progress and settlement events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// The job currently in flight, if any.
    pub fn current_job(&self) -> Option<JobId> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(id, _)| *id)
    }

    /// Request cancellation of the in-flight job.
    ///
    /// Returns whether `job_id` matched it. Honored at the controller's
    /// next checkpoint; the engine call itself is not preempted.
    pub fn abort(&self, job_id: JobId) -> bool {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some((held, token)) if *held == job_id => {
                tracing::info!(%job_id, "Abort requested");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Run one vectorization job to settlement.
    ///
    /// Exactly one terminal outcome per job: either the artifact with its
    /// stats, or a classified [`ErrorRecord`]. In both cases the engine
    /// instance has been destroyed before this returns.
    pub async fn submit(
        &self,
        image: ImageDescriptor,
        config: ConfigBag,
    ) -> Result<JobOutcome, SubmitError> {
        let mut responses = self.responses.try_lock().map_err(|_| SubmitError::Busy)?;

        let mut job = Job::new();
        tracing::info!(job_id = %job.id, "Job submitted");

        // Normalization happens before any engine work; fatal violations
        // never acquire an instance.
        job.advance(JobStatus::Normalizing);
        let normalized = match normalize(&config) {
            Ok(outcome) => outcome,
            Err(rejection) => {
                let record = ErrorRecord::invalid_config(&rejection.violations);
                return Err(self.fail(&mut job, JobStatus::Failed, record));
            }
        };
        job.violation_count = normalized.violations.len();
        for violation in &normalized.violations {
            tracing::debug!(job_id = %job.id, %violation, "Normalization violation");
        }

        let deadline = self.policy.effective_deadline(&image, &normalized.settings);
        job.deadline_ms = deadline.deadline_ms;
        if deadline.emergency {
            tracing::warn!(
                job_id = %job.id,
                deadline_ms = job.deadline_ms,
                "Pathological configuration; emergency deadline applied"
            );
        }

        job.advance(JobStatus::Acquiring);
        if let Err(record) = self.ensure_ready(&mut responses, job.id).await {
            return Err(self.fail(&mut job, JobStatus::Failed, record));
        }

        let abort_token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((job.id, abort_token.clone()));
        self.events.publish(JobEvent::Started {
            job_id: job.id,
            deadline_ms: job.deadline_ms,
            started_at: job.started_at,
        });

        if let Err(e) = self.context.send(EngineRequest::Process {
            id: job.id,
            image,
            settings: Some(normalized.settings),
        }) {
            let record = ErrorRecord::protocol(e.to_string());
            return Err(self.fail(&mut job, JobStatus::Failed, record));
        }
        job.advance(JobStatus::Running);

        let dispatched = Instant::now();
        let sleep = tokio::time::sleep(Duration::from_millis(job.deadline_ms));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                // Deadline expired. The engine call may keep running
                // invisibly; stop waiting, tear down, settle.
                _ = &mut sleep => {
                    tracing::warn!(job_id = %job.id, deadline_ms = job.deadline_ms, "Job deadline expired");
                    self.instances.force_release(job.id);
                    self.needs_init.store(true, Ordering::SeqCst);
                    let record = ErrorRecord::timeout(job.deadline_ms);
                    return Err(self.fail(&mut job, JobStatus::TimedOut, record));
                }

                _ = abort_token.cancelled() => {
                    let _ = self.context.send(EngineRequest::Abort { id: job.id });
                    self.instances.force_release(job.id);
                    self.needs_init.store(true, Ordering::SeqCst);
                    let record = ErrorRecord::cancelled();
                    return Err(self.fail(&mut job, JobStatus::Aborted, record));
                }

                response = responses.recv() => {
                    let Some(response) = response else {
                        self.instances.force_release(job.id);
                        let record = ErrorRecord::protocol("execution context channel closed");
                        return Err(self.fail(&mut job, JobStatus::Failed, record));
                    };
                    // Late responses from an earlier, already-settled job
                    // (a timed-out call that finally returned) are
                    // discarded by correlation id.
                    if response.correlation_id() != job.id {
                        tracing::debug!(stale_id = %response.correlation_id(), job_id = %job.id, "Discarding stale response");
                        continue;
                    }
                    match response {
                        EngineResponse::Progress { stage, percent, message, .. } => {
                            self.events.publish(JobEvent::Progress(ProgressEvent {
                                job_id: job.id,
                                stage,
                                percent,
                                message,
                            }));
                        }
                        EngineResponse::Success { data: SuccessData::Completed { artifact }, .. } => {
                            let stats = JobStats {
                                duration_ms: dispatched.elapsed().as_millis() as u64,
                                deadline_ms: job.deadline_ms,
                                violation_count: job.violation_count,
                            };
                            job.advance(JobStatus::Succeeded);
                            self.settle(&job, None, Some(stats.clone()));
                            return Ok(JobOutcome { job_id: job.id, artifact, stats });
                        }
                        // Acks for non-process requests carry nothing.
                        EngineResponse::Success { .. } => {}
                        EngineResponse::Error { message, .. } => {
                            self.needs_init.store(true, Ordering::SeqCst);
                            let record = classify(&message);
                            let terminal = if record.code == ErrorCategory::Cancelled {
                                JobStatus::Aborted
                            } else {
                                JobStatus::Failed
                            };
                            return Err(self.fail(&mut job, terminal, record));
                        }
                    }
                }
            }
        }
    }

    /// Gracefully stop the execution context.
    ///
    /// Waits for the in-flight job (if any) to settle, then asks the
    /// context to clean up, with a bounded grace period.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job controller");
        let mut responses = self.responses.lock().await;
        if self
            .context
            .send(EngineRequest::Cleanup { id: JobId::new() })
            .is_err()
        {
            return;
        }
        let acked = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(response) = responses.recv().await {
                if matches!(
                    response,
                    EngineResponse::Success {
                        data: SuccessData::CleanedUp,
                        ..
                    }
                ) {
                    break;
                }
            }
        })
        .await;
        if acked.is_err() {
            tracing::warn!("Execution context did not acknowledge cleanup in time");
        }
    }

    // ---- private helpers ----

    /// Bring the context to a serviceable state if the previous job left
    /// it poisoned (fault, timeout, abort) or it was never initialized.
    async fn ensure_ready(
        &self,
        responses: &mut mpsc::UnboundedReceiver<EngineResponse>,
        job_id: JobId,
    ) -> Result<(), ErrorRecord> {
        if !self.needs_init.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.context
            .send(EngineRequest::Init {
                id: job_id,
                config: None,
            })
            .map_err(|e| ErrorRecord::protocol(e.to_string()))?;
        loop {
            match responses.recv().await {
                None => return Err(ErrorRecord::protocol("execution context channel closed")),
                // Also drains stale traffic left over from settled jobs.
                Some(response) if response.correlation_id() != job_id => continue,
                Some(EngineResponse::Success { .. }) => {
                    self.needs_init.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                Some(EngineResponse::Error { message, .. }) => return Err(classify(&message)),
                Some(EngineResponse::Progress { .. }) => continue,
            }
        }
    }

    /// Settle a job as failed: advance to the terminal status, emit the
    /// terminal event, and wrap the record for the caller.
    fn fail(&self, job: &mut Job, terminal: JobStatus, record: ErrorRecord) -> SubmitError {
        job.advance(terminal);
        self.settle(job, Some(record.clone()), None);
        SubmitError::Failed(record)
    }

    /// Emit the job's single terminal event and clear its abort entry.
    fn settle(&self, job: &Job, error: Option<ErrorRecord>, stats: Option<JobStats>) {
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(current.as_ref(), Some((held, _)) if *held == job.id) {
                *current = None;
            }
        }
        tracing::info!(job_id = %job.id, status = ?job.status, "Job settled");
        self.events.publish(JobEvent::Settled {
            job_id: job.id,
            status: job.status,
            error,
            stats,
            ended_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_never_leaves_a_terminal_state() {
        let mut job = Job::new();
        job.advance(JobStatus::Normalizing);
        job.advance(JobStatus::Failed);
        job.advance(JobStatus::Running);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn submit_error_exposes_its_record() {
        assert!(SubmitError::Busy.record().is_none());
        let failed = SubmitError::Failed(ErrorRecord::cancelled());
        assert_eq!(failed.record().unwrap().code, ErrorCategory::Cancelled);
    }
}
