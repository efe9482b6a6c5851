//! Compute-resource listener behaviour against an in-memory store

use batcho_client::MemoryStore;
use batcho_core::domain::job::{Job, JobStatus};
use batcho_runner::{
    BatchCoordinator, BatchOutcome, ComputeResourceListener, ErrorKind, JobRegistry, RunPhase,
    listen_as_compute_resource,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const RESOURCE: &str = "cluster-a";

fn coordinator(cache: &TempDir) -> Arc<BatchCoordinator> {
    let store = Arc::new(MemoryStore::with_cache_dir(cache.path()));

    let mut registry = JobRegistry::new();
    registry
        .register_fn("echo", |_| Ok(()), |job, _| Ok(Value::String(job.label.clone())))
        .register_fn("fail", |_| Ok(()), |_, _| anyhow::bail!("boom"));

    Arc::new(BatchCoordinator::new(store, Arc::new(registry)))
}

fn listener(coordinator: &Arc<BatchCoordinator>) -> ComputeResourceListener {
    ComputeResourceListener::new(
        RESOURCE,
        coordinator.clone(),
        RunPhase::InProcess,
        Duration::from_secs(4),
    )
}

async fn pending(coordinator: &BatchCoordinator) -> Vec<String> {
    coordinator
        .get_batch_names_for_compute_resource(RESOURCE)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_poll_with_nothing_pending() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);

    assert!(listener(&coordinator).poll_once().await.unwrap().is_none());
}

#[tokio::test]
async fn test_completed_batch_is_assembled_and_dequeued() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    coordinator
        .set_batch(
            "b1",
            vec![Job::new("echo", "x"), Job::new("echo", "y")],
            Some(RESOURCE),
        )
        .await
        .unwrap();

    let (name, outcome) = listener(&coordinator).poll_once().await.unwrap().unwrap();

    assert_eq!(name, "b1");
    assert_eq!(outcome, BatchOutcome::Completed);
    assert!(pending(&coordinator).await.is_empty());

    let results = coordinator.get_batch_results("b1").await.unwrap().unwrap();
    let values: Vec<_> = results.results.iter().map(|r| r.result.clone()).collect();
    assert_eq!(values, vec![Value::from("x"), Value::from("y")]);
}

#[tokio::test]
async fn test_failed_batch_is_dequeued_without_retry() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    coordinator
        .set_batch("b1", vec![Job::new("fail", "bad")], Some(RESOURCE))
        .await
        .unwrap();

    let mut listener = listener(&coordinator);
    let (_, outcome) = listener.poll_once().await.unwrap().unwrap();

    match outcome {
        BatchOutcome::Failed { kind, message } => {
            assert_eq!(kind, ErrorKind::Execution);
            assert!(message.contains("bad"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(pending(&coordinator).await.is_empty());
    assert!(coordinator.get_batch_results("b1").await.unwrap().is_none());

    let statuses = coordinator.get_batch_job_statuses("b1", None).await.unwrap().unwrap();
    assert_eq!(statuses[0].status, Some(JobStatus::Error));

    assert!(listener.poll_once().await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_command_fails_batch_as_configuration_error() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    coordinator
        .set_batch("b1", vec![Job::new("render", "frame 1")], Some(RESOURCE))
        .await
        .unwrap();

    let (_, outcome) = listener(&coordinator).poll_once().await.unwrap().unwrap();

    assert!(matches!(
        outcome,
        BatchOutcome::Failed {
            kind: ErrorKind::Configuration,
            ..
        }
    ));
    assert!(pending(&coordinator).await.is_empty());
}

#[tokio::test]
async fn test_invisible_batch_stays_pending() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    coordinator
        .batch_store()
        .add_batch_name_for_compute_resource(RESOURCE, "not-yet")
        .await
        .unwrap();

    let (name, outcome) = listener(&coordinator).poll_once().await.unwrap().unwrap();

    assert_eq!(name, "not-yet");
    assert_eq!(outcome, BatchOutcome::NotVisible);
    assert_eq!(pending(&coordinator).await, vec!["not-yet"]);
}

#[tokio::test]
async fn test_round_robin_does_not_starve_later_batches() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    coordinator
        .batch_store()
        .add_batch_name_for_compute_resource(RESOURCE, "stuck")
        .await
        .unwrap();
    coordinator
        .set_batch("b2", vec![Job::new("echo", "z")], Some(RESOURCE))
        .await
        .unwrap();

    let mut listener = listener(&coordinator);

    let (first, _) = listener.poll_once().await.unwrap().unwrap();
    let (second, outcome) = listener.poll_once().await.unwrap().unwrap();
    assert_eq!(first, "stuck");
    assert_eq!(second, "b2");
    assert_eq!(outcome, BatchOutcome::Completed);

    // Position wraps back to the start of the shorter list
    let (third, _) = listener.poll_once().await.unwrap().unwrap();
    assert_eq!(third, "stuck");
}

#[tokio::test(start_paused = true)]
async fn test_listener_stops_when_cancelled() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(listen_as_compute_resource(
        coordinator,
        RESOURCE,
        RunPhase::InProcess,
        Duration::from_secs(3600),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!handle.is_finished());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_listener_handles_batches_published_while_running() {
    let cache = TempDir::new().unwrap();
    let coordinator = coordinator(&cache);
    let shutdown = CancellationToken::new();

    let mut listener = listener(&coordinator);
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { listener.run(token).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    coordinator
        .set_batch("late", vec![Job::new("echo", "hi")], Some(RESOURCE))
        .await
        .unwrap();

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(4)).await;
        if coordinator.get_batch_results("late").await.unwrap().is_some() {
            break;
        }
    }

    assert!(coordinator.get_batch_results("late").await.unwrap().is_some());
    assert!(pending(&coordinator).await.is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}
