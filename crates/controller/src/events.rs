//! Per-job event stream backed by a `tokio::sync::broadcast` channel.
//!
//! Callers subscribe out-of-band and filter by job id. Progress events
//! are lossy by design (a slow subscriber observes `RecvError::Lagged`);
//! terminal outcomes additionally travel on the `submit` return path, so
//! nothing load-bearing rides this bus.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracekit_core::error::ErrorRecord;
use tracekit_core::types::{JobId, JobStats, JobStatus, ProgressEvent};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Everything observable about a job from the outside.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Normalization passed and the job is headed for the engine.
    Started {
        job_id: JobId,
        deadline_ms: u64,
        started_at: DateTime<Utc>,
    },

    /// Relayed engine progress. May be dropped under backpressure.
    Progress(ProgressEvent),

    /// The job settled. Emitted exactly once per job, after teardown.
    Settled {
        job_id: JobId,
        status: JobStatus,
        error: Option<ErrorRecord>,
        stats: Option<JobStats>,
        ended_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Started { job_id, .. } | JobEvent::Settled { job_id, .. } => *job_id,
            JobEvent::Progress(progress) => progress.job_id,
        }
    }
}

/// In-process fan-out bus for [`JobEvent`]s.
///
/// Shared via `Arc`; any number of subscribers independently receive
/// every published event.
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. With zero subscribers the
    /// event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = JobEventBus::default();
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        bus.publish(JobEvent::Started {
            job_id,
            deadline_ms: 30_000,
            started_at: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id(), job_id);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_the_same_event() {
        let bus = JobEventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let progress = ProgressEvent {
            job_id: JobId::new(),
            stage: "edges".into(),
            percent: 40.0,
            message: None,
        };
        bus.publish(JobEvent::Progress(progress.clone()));

        assert_eq!(rx1.recv().await.unwrap().job_id(), progress.job_id);
        assert_eq!(rx2.recv().await.unwrap().job_id(), progress.job_id);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = JobEventBus::default();
        bus.publish(JobEvent::Settled {
            job_id: JobId::new(),
            status: JobStatus::Succeeded,
            error: None,
            stats: None,
            ended_at: Utc::now(),
        });
    }
}
