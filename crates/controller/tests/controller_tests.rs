//! End-to-end controller tests against a scripted engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use tracekit_controller::{DeadlinePolicy, JobController, JobEvent, SubmitError};
use tracekit_core::config::{Backend, ConfigBag};
use tracekit_core::error::{ErrorCategory, Retryability};
use tracekit_core::types::{ImageDescriptor, JobStatus};
use tracekit_engine::mock::{Script, ScriptedFactory};

fn image() -> ImageDescriptor {
    ImageDescriptor::new(vec![0; 4], 1, 1).unwrap()
}

fn controller_with(factory: &ScriptedFactory) -> JobController {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    JobController::new(factory.clone_arc(), DeadlinePolicy::default())
}

/// A bag with a short deadline, for tests that exercise the racing path.
fn short_deadline_bag(deadline_ms: u64) -> ConfigBag {
    ConfigBag {
        deadline_override_ms: Some(deadline_ms),
        ..ConfigBag::default()
    }
}

#[tokio::test]
async fn successful_job_returns_artifact_and_stats() {
    let factory = ScriptedFactory::new(Script::Succeed).with_progress(&[("edges", 50.0)]);
    let controller = controller_with(&factory);
    let mut events = controller.subscribe();

    let outcome = controller
        .submit(image(), ConfigBag::default())
        .await
        .unwrap();
    assert!(outcome.artifact.svg.contains("<svg"));
    assert_eq!(outcome.stats.violation_count, 0);
    assert_eq!(outcome.stats.deadline_ms, 30_000);

    // Instance torn down by the time the result is visible.
    assert_eq!(factory.counters().destroyed(), 1);

    // Started -> Progress -> Settled, all correlated to the job.
    assert_matches!(events.recv().await.unwrap(), JobEvent::Started { job_id, .. } => {
        assert_eq!(job_id, outcome.job_id);
    });
    assert_matches!(events.recv().await.unwrap(), JobEvent::Progress(p) => {
        assert_eq!(p.job_id, outcome.job_id);
        assert_eq!(p.stage, "edges");
    });
    assert_matches!(events.recv().await.unwrap(), JobEvent::Settled { status, error, stats, .. } => {
        assert_eq!(status, JobStatus::Succeeded);
        assert!(error.is_none());
        assert_eq!(stats.unwrap().violation_count, 0);
    });
}

#[tokio::test]
async fn clamped_values_are_counted_but_not_fatal() {
    let factory = ScriptedFactory::new(Script::Succeed);
    let controller = controller_with(&factory);

    let outcome = controller
        .submit(
            image(),
            ConfigBag {
                stroke_width: Some(999.0),
                ..ConfigBag::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.stats.violation_count, 1);
}

#[tokio::test]
async fn fatal_config_fails_fast_without_touching_the_engine() {
    let factory = ScriptedFactory::new(Script::Succeed);
    let controller = controller_with(&factory);
    let mut events = controller.subscribe();

    let err = controller
        .submit(
            image(),
            ConfigBag {
                backend: Some(Backend::Dots),
                boundary_epsilon: Some(1.5),
                ..ConfigBag::default()
            },
        )
        .await
        .unwrap_err();
    let record = err.record().unwrap();
    assert_eq!(record.code, ErrorCategory::InvalidConfig);
    assert!(record.suggestions.iter().any(|s| s.contains("boundary_epsilon")));

    // No instance was ever created.
    assert_eq!(factory.counters().created(), 0);

    assert_matches!(events.recv().await.unwrap(), JobEvent::Settled { status, .. } => {
        assert_eq!(status, JobStatus::Failed);
    });
}

#[tokio::test]
async fn engine_trap_is_classified_as_engine_fault() {
    let factory = ScriptedFactory::new(Script::Fault("unreachable executed at 0x42".into()));
    let controller = controller_with(&factory);

    let err = controller
        .submit(image(), ConfigBag::default())
        .await
        .unwrap_err();
    let record = err.record().unwrap();
    assert_eq!(record.code, ErrorCategory::EngineFault);
    assert_eq!(record.retryable, Retryability::No);
    // The raw diagnostic survives classification.
    assert!(record.raw.contains("unreachable executed at 0x42"));

    assert_eq!(factory.counters().destroyed(), 1);
}

#[tokio::test]
async fn controller_reinitializes_the_context_after_a_fault() {
    let factory = ScriptedFactory::new(Script::Fault("runtime error: boom".into()));
    let controller = controller_with(&factory);

    let first = controller
        .submit(image(), ConfigBag::default())
        .await
        .unwrap_err();
    assert_eq!(first.record().unwrap().code, ErrorCategory::EngineFault);

    // A fresh instance is created for the second job; without the
    // re-initialization step the context would reject it structurally.
    let second = controller
        .submit(image(), ConfigBag::default())
        .await
        .unwrap_err();
    assert_eq!(second.record().unwrap().code, ErrorCategory::EngineFault);
    assert_eq!(factory.counters().created(), 2);
    assert_eq!(factory.counters().destroyed(), 2);
}

#[tokio::test]
async fn hanging_engine_times_out_near_the_deadline() {
    let factory = ScriptedFactory::new(Script::Hang);
    let controller = controller_with(&factory);
    let mut events = controller.subscribe();

    let start = Instant::now();
    let err = controller
        .submit(image(), short_deadline_bag(200))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    let record = err.record().unwrap();
    assert_eq!(record.code, ErrorCategory::Timeout);
    assert_eq!(record.retryable, Retryability::Yes);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(2_000), "took {elapsed:?}");

    // Teardown ran exactly once, before the terminal outcome.
    assert_eq!(factory.counters().destroyed(), 1);

    while let Ok(event) = events.recv().await {
        if let JobEvent::Settled { status, .. } = event {
            assert_eq!(status, JobStatus::TimedOut);
            break;
        }
    }
}

#[tokio::test]
async fn stale_response_from_a_timed_out_job_is_discarded() {
    let factory = ScriptedFactory::new(Script::Hang);
    let controller = controller_with(&factory);

    // First job times out; its engine call unblocks on teardown and
    // reports a late error nobody is waiting for.
    let first = controller
        .submit(image(), short_deadline_bag(150))
        .await
        .unwrap_err();
    assert_eq!(first.record().unwrap().code, ErrorCategory::Timeout);

    // The second job must not consume the first job's late error as its
    // own terminal outcome: it hangs and times out on its own deadline.
    let second = controller
        .submit(image(), short_deadline_bag(150))
        .await
        .unwrap_err();
    assert_eq!(second.record().unwrap().code, ErrorCategory::Timeout);

    assert_eq!(factory.counters().destroyed(), 2);
}

#[tokio::test]
async fn second_submit_while_in_flight_is_rejected() {
    let factory = ScriptedFactory::new(Script::Slow(Duration::from_millis(300)));
    let controller = Arc::new(controller_with(&factory));

    let first = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit(image(), ConfigBag::default()).await })
    };
    // Give the first submit time to take the gate.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = controller.submit(image(), ConfigBag::default()).await;
    assert_matches!(second, Err(SubmitError::Busy));

    // The in-flight job is unaffected by the rejected one.
    assert!(first.await.unwrap().is_ok());
    assert_eq!(factory.counters().runs(), 1);
}

#[tokio::test]
async fn abort_settles_the_job_and_tears_down() {
    let factory = ScriptedFactory::new(Script::Hang);
    let controller = Arc::new(controller_with(&factory));
    let mut events = controller.subscribe();

    let submitted = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit(image(), ConfigBag::default()).await })
    };

    // Learn the job id from the event stream, then abort.
    let job_id = loop {
        if let JobEvent::Started { job_id, .. } = events.recv().await.unwrap() {
            break job_id;
        }
    };
    assert!(controller.abort(job_id));

    let err = submitted.await.unwrap().unwrap_err();
    let record = err.record().unwrap();
    assert_eq!(record.code, ErrorCategory::Cancelled);
    assert_eq!(record.retryable, Retryability::NotApplicable);
    assert_eq!(factory.counters().destroyed(), 1);

    while let Ok(event) = events.recv().await {
        if let JobEvent::Settled { status, .. } = event {
            assert_eq!(status, JobStatus::Aborted);
            break;
        }
    }
}

#[tokio::test]
async fn abort_of_an_unknown_job_is_a_no_op() {
    let factory = ScriptedFactory::new(Script::Succeed);
    let controller = controller_with(&factory);
    assert!(!controller.abort(tracekit_core::types::JobId::new()));
}

#[tokio::test]
async fn dependency_fixes_flow_through_to_job_stats() {
    let factory = ScriptedFactory::new(Script::Succeed);
    let controller = controller_with(&factory);

    // bezier_fitting alone pulls in flow_tracing and etf_fdog.
    let outcome = controller
        .submit(
            image(),
            ConfigBag {
                backend: Some(Backend::Edge),
                bezier_fitting: Some(true),
                ..ConfigBag::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.stats.violation_count, 2);
}

#[tokio::test]
async fn pathological_configuration_uses_the_emergency_deadline() {
    let factory = ScriptedFactory::new(Script::Succeed);
    let controller = controller_with(&factory);

    let outcome = controller
        .submit(
            image(),
            ConfigBag {
                backend: Some(Backend::Edge),
                flow_tracing: Some(true),
                ..ConfigBag::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.stats.deadline_ms, 10_000);
}

#[tokio::test]
async fn shutdown_stops_the_execution_context() {
    let factory = ScriptedFactory::new(Script::Succeed);
    let controller = controller_with(&factory);

    controller
        .submit(image(), ConfigBag::default())
        .await
        .unwrap();
    controller.shutdown().await;

    // The context is gone; a new submit cannot reach it.
    let err = controller
        .submit(image(), ConfigBag::default())
        .await
        .unwrap_err();
    assert_eq!(
        err.record().unwrap().code,
        ErrorCategory::ProtocolError
    );
}
