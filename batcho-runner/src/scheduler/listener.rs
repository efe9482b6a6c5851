//! Compute-resource listener
//!
//! Polls the pending set of one compute resource and handles its batches one
//! at a time, round-robin. Each discovered batch is handled at most once:
//! whether it completes or fails, it is dropped from the pending set and
//! must be republished to run again.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{BatchError, ErrorKind, Result};
use crate::scheduler::RunPhase;
use crate::service::BatchCoordinator;

/// Result of one attempt at handling a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch is not readable yet; it stays pending
    NotVisible,
    /// Prepared, run and assembled
    Completed,
    /// A step failed; the batch was dropped from the pending set
    Failed { kind: ErrorKind, message: String },
}

/// Polling loop for a single compute resource
pub struct ComputeResourceListener {
    compute_resource: String,
    coordinator: Arc<BatchCoordinator>,
    run_phase: RunPhase,
    poll_interval: Duration,
    next_index: usize,
}

impl ComputeResourceListener {
    pub fn new(
        compute_resource: impl Into<String>,
        coordinator: Arc<BatchCoordinator>,
        run_phase: RunPhase,
        poll_interval: Duration,
    ) -> Self {
        Self {
            compute_resource: compute_resource.into(),
            coordinator,
            run_phase,
            poll_interval,
            next_index: 0,
        }
    }

    pub fn compute_resource(&self) -> &str {
        &self.compute_resource
    }

    /// Polls until `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Listening as compute resource {} (interval: {:?})",
            self.compute_resource, self.poll_interval
        );

        while !shutdown.is_cancelled() {
            match self.poll_once().await {
                Ok(Some((batch_name, outcome))) => {
                    debug!("Batch {} handled: {:?}", batch_name, outcome);
                }
                Ok(None) => {
                    debug!("No pending batches for {}", self.compute_resource);
                }
                Err(e) => {
                    error!("Error polling compute resource {}: {}", self.compute_resource, e);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Stopped listening as compute resource {}", self.compute_resource);
    }

    /// One iteration: picks the next pending batch and tries to handle it
    ///
    /// Returns `None` when nothing is pending.
    pub async fn poll_once(&mut self) -> Result<Option<(String, BatchOutcome)>> {
        let batch_names = self
            .coordinator
            .get_batch_names_for_compute_resource(&self.compute_resource)
            .await?;

        if batch_names.is_empty() {
            return Ok(None);
        }

        if self.next_index >= batch_names.len() {
            self.next_index = 0;
        }
        let batch_name = batch_names[self.next_index].clone();
        self.next_index += 1;

        let outcome = self.try_handle_batch(&batch_name).await?;
        Ok(Some((batch_name, outcome)))
    }

    /// Prepares, runs and assembles a batch, then drops it from the pending set
    ///
    /// Only errors while touching the pending set itself are returned; step
    /// failures are reported as [`BatchOutcome::Failed`].
    pub async fn try_handle_batch(&self, batch_name: &str) -> Result<BatchOutcome> {
        let outcome = match self.handle_batch(batch_name).await {
            Ok(false) => {
                debug!("Batch {} is not visible yet", batch_name);
                return Ok(BatchOutcome::NotVisible);
            }
            Ok(true) => {
                info!("Completed batch {}", batch_name);
                BatchOutcome::Completed
            }
            Err(e) => {
                error!("Error handling batch {}: {}", batch_name, e);
                BatchOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        self.coordinator
            .remove_batch_name_for_compute_resource(&self.compute_resource, batch_name)
            .await?;

        Ok(outcome)
    }

    async fn handle_batch(&self, batch_name: &str) -> Result<bool> {
        if !self.coordinator.prepare_batch(batch_name, true, None).await? {
            return Ok(false);
        }

        self.run_phase.run(&self.coordinator, batch_name).await?;

        if !self.coordinator.assemble_batch(batch_name).await? {
            return Err(BatchError::CorruptBatch {
                batch_name: batch_name.to_string(),
                reason: "batch disappeared before assembly".to_string(),
            });
        }

        Ok(true)
    }
}

/// Runs a listener for `compute_resource` until `shutdown` is cancelled
pub async fn listen_as_compute_resource(
    coordinator: Arc<BatchCoordinator>,
    compute_resource: &str,
    run_phase: RunPhase,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    ComputeResourceListener::new(compute_resource, coordinator, run_phase, poll_interval)
        .run(shutdown)
        .await;
}
