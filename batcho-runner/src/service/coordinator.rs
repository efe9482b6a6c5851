//! Batch coordinator service
//!
//! Batch-level operations: publishing, preparing, running, assembling and
//! clearing batches. Every operation takes an explicit batch name and most
//! accept an optional job index to restrict them to one job.

use batcho_client::KeyValueStore;
use batcho_core::domain::batch::{AssembledBatchResult, Batch, BatchJobResult};
use batcho_core::domain::job::{Job, JobStatus, JobStatusEntry};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::JobContext;
use crate::error::{BatchError, Result};
use crate::repository::BatchStore;
use crate::service::console::ConsoleCapture;
use crate::service::registry::{JobCommand, JobRegistry};

/// Length of the random code identifying one `run_batch` invocation
pub const JOB_CODE_LEN: usize = 10;

/// Coordinates batch processing against a shared store
///
/// A coordinator owns one console capture and runs one job at a time.
/// Independent coordinators (in one process or many) may work on the same
/// batch; per-job locks keep each job's run phase exclusive.
pub struct BatchCoordinator {
    store: BatchStore,
    registry: Arc<JobRegistry>,
    console: Arc<ConsoleCapture>,
}

impl BatchCoordinator {
    /// Creates a coordinator over a key/value store
    pub fn new(store: Arc<dyn KeyValueStore>, registry: Arc<JobRegistry>) -> Self {
        Self::with_batch_store(BatchStore::new(store), registry)
    }

    /// Creates a coordinator over a preconfigured batch store
    pub fn with_batch_store(store: BatchStore, registry: Arc<JobRegistry>) -> Self {
        Self {
            store,
            registry,
            console: Arc::new(ConsoleCapture::new()),
        }
    }

    /// Replaces the console capture jobs run under
    pub fn with_console(mut self, console: Arc<ConsoleCapture>) -> Self {
        self.console = console;
        self
    }

    pub fn batch_store(&self) -> &BatchStore {
        &self.store
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    // =============================================================================
    // Publishing
    // =============================================================================

    /// Publishes a batch, optionally queueing it on a compute resource
    pub async fn set_batch(&self, batch_name: &str, jobs: Vec<Job>, compute_resource: Option<&str>) -> Result<()> {
        let batch = Batch::new(jobs);
        self.store.store_batch(batch_name, &batch).await?;
        info!("Published batch {} with {} job(s)", batch_name, batch.len());

        if let Some(compute_resource) = compute_resource {
            self.store
                .add_batch_name_for_compute_resource(compute_resource, batch_name)
                .await?;
            info!("Queued batch {} on compute resource {}", batch_name, compute_resource);
        }

        Ok(())
    }

    // =============================================================================
    // Prepare phase
    // =============================================================================

    /// Runs the prepare callback of every targeted job that is not finished
    ///
    /// With `clear_jobs`, unfinished jobs have their status and lock cleared
    /// first, so ready, running and failed jobs are all prepared again.
    /// Without it, only jobs with no status are prepared.
    ///
    /// Returns `Ok(false)` if the batch could not be retrieved.
    pub async fn prepare_batch(&self, batch_name: &str, clear_jobs: bool, job_index: Option<usize>) -> Result<bool> {
        let Some(batch) = self.store.retrieve_batch(batch_name).await? else {
            return Ok(false);
        };

        let mut prepared = 0;
        let mut skipped = 0;

        for (index, job) in select_jobs(batch_name, &batch, job_index)? {
            let mut status = self.store.get_job_status(batch_name, index).await?;

            if status == Some(JobStatus::Finished) {
                skipped += 1;
                continue;
            }

            if clear_jobs && status.is_some() {
                self.store.set_job_status(batch_name, index, None, None).await?;
                self.store.clear_job_lock(batch_name, index).await?;
                status = None;
            }

            if let Some(status) = status {
                debug!("Not preparing job {} (status: {})", job.label, status);
                skipped += 1;
                continue;
            }

            let command = self.registry.lookup(job)?;
            if let Err(e) = command.prepare(job).await {
                error!("Error preparing job {}: {:#}", job.label, e);
                return Err(BatchError::PrepareFailed {
                    label: job.label.clone(),
                    source: e.into(),
                });
            }

            self.store
                .set_job_status(batch_name, index, Some(JobStatus::Ready), None)
                .await?;
            self.store.clear_job_lock(batch_name, index).await?;
            prepared += 1;
        }

        info!(
            "Prepared {} job(s) of batch {} ({} skipped)",
            prepared, batch_name, skipped
        );
        Ok(true)
    }

    // =============================================================================
    // Run phase
    // =============================================================================

    /// Runs every targeted job that is ready and whose lock can be taken
    ///
    /// All jobs run by one call share a freshly generated job code. The first
    /// failing job aborts the call with [`BatchError::RunFailed`] after its
    /// `error` status and console output are recorded.
    ///
    /// Returns `Ok(false)` if the batch could not be retrieved or is halted.
    pub async fn run_batch(&self, batch_name: &str, job_index: Option<usize>) -> Result<bool> {
        let Some(batch) = self.store.retrieve_batch(batch_name).await? else {
            return Ok(false);
        };

        if self.store.is_batch_halted(batch_name).await? {
            info!("Batch {} is halted, not running", batch_name);
            return Ok(false);
        }

        let job_code = generate_job_code();
        debug!("Running batch {} with job code {}", batch_name, job_code);

        let mut ran = 0;
        let mut contended = 0;

        for (index, job) in select_jobs(batch_name, &batch, job_index)? {
            if self.store.is_batch_halted(batch_name).await? {
                info!("Batch {} was halted after {} job(s)", batch_name, ran);
                return Ok(false);
            }

            if self.store.get_job_status(batch_name, index).await? != Some(JobStatus::Ready) {
                continue;
            }

            let command = self.registry.lookup(job)?;

            if !self.store.acquire_job_lock(batch_name, index, &job_code).await? {
                debug!("Job {} is locked by another worker", job.label);
                contended += 1;
                continue;
            }

            self.run_job(batch_name, index, job, command.as_ref(), &job_code)
                .await?;
            ran += 1;
        }

        if contended > 0 {
            warn!(
                "Skipped {} job(s) of batch {} locked by other workers",
                contended, batch_name
            );
        }
        info!("Ran {} job(s) of batch {}", ran, batch_name);
        Ok(true)
    }

    /// Runs one locked job inside a console capture
    async fn run_job(
        &self,
        batch_name: &str,
        job_index: usize,
        job: &Job,
        command: &dyn JobCommand,
        job_code: &str,
    ) -> Result<()> {
        let code = Some(job_code);

        self.store
            .set_job_status(batch_name, job_index, Some(JobStatus::Running), code)
            .await?;
        info!("Running job {}", job.label);

        let outcome = match self.console.start_writing_to_file() {
            Ok(_) => {
                let ctx = JobContext::new(batch_name, job_index, Arc::clone(&self.console));
                command.run(job, &ctx).await
            }
            Err(e) => Err(anyhow::Error::new(e).context("failed to start console capture")),
        };
        let capture = self.console.stop_writing_to_file();

        match outcome {
            Ok(result) => {
                if let Some(file) = capture {
                    self.store
                        .set_job_console_output(batch_name, job_index, &file, code)
                        .await?;
                }

                self.store
                    .set_job_result(batch_name, job_index, &result, code)
                    .await?;
                self.store
                    .set_job_status(batch_name, job_index, Some(JobStatus::Finished), code)
                    .await?;

                info!("Finished job {}", job.label);
                Ok(())
            }
            Err(e) => {
                error!("Error running job {}: {:#}", job.label, e);

                if let Err(store_err) = self
                    .store
                    .set_job_status(batch_name, job_index, Some(JobStatus::Error), code)
                    .await
                {
                    warn!("Failed to record error status of job {}: {}", job.label, store_err);
                }

                if let Some(file) = capture {
                    if let Err(store_err) = self
                        .store
                        .set_job_console_output(batch_name, job_index, &file, code)
                        .await
                    {
                        warn!("Failed to save console output of job {}: {}", job.label, store_err);
                    }
                }

                Err(BatchError::RunFailed {
                    label: job.label.clone(),
                    source: e.into(),
                })
            }
        }
    }

    // =============================================================================
    // Assemble and clear
    // =============================================================================

    /// Collects the results of a fully finished batch into one object
    ///
    /// Considers every job regardless of any index filter used elsewhere.
    /// Returns `Ok(false)` if the batch could not be retrieved.
    pub async fn assemble_batch(&self, batch_name: &str) -> Result<bool> {
        let Some(batch) = self.store.retrieve_batch(batch_name).await? else {
            return Ok(false);
        };

        let mut results = Vec::with_capacity(batch.len());

        for (index, job) in batch.jobs.iter().enumerate() {
            let status = self.store.get_job_status(batch_name, index).await?;
            if status != Some(JobStatus::Finished) {
                return Err(BatchError::Incomplete {
                    label: job.label.clone(),
                    status,
                });
            }

            let Some(result) = self.store.get_job_result(batch_name, index).await? else {
                return Err(BatchError::MissingResult {
                    label: job.label.clone(),
                });
            };

            results.push(BatchJobResult {
                job: job.clone(),
                result,
            });
        }

        self.store
            .set_batch_result(batch_name, &AssembledBatchResult { results })
            .await?;
        info!("Assembled {} result(s) of batch {}", batch.len(), batch_name);
        Ok(true)
    }

    /// Resets the status and lock of every targeted job that has a status
    ///
    /// Results and console output already stored are left in place.
    /// Returns `Ok(false)` if the batch could not be retrieved.
    pub async fn clear_batch_jobs(&self, batch_name: &str, job_index: Option<usize>) -> Result<bool> {
        let Some(batch) = self.store.retrieve_batch(batch_name).await? else {
            return Ok(false);
        };

        let mut cleared = 0;
        for (index, _) in select_jobs(batch_name, &batch, job_index)? {
            if self.store.get_job_status(batch_name, index).await?.is_none() {
                continue;
            }

            self.store.set_job_status(batch_name, index, None, None).await?;
            self.store.clear_job_lock(batch_name, index).await?;
            cleared += 1;
        }

        info!("Cleared {} job(s) of batch {}", cleared, batch_name);
        Ok(true)
    }

    // =============================================================================
    // Halting
    // =============================================================================

    /// Asks workers to stop running jobs of a batch
    ///
    /// Jobs already running finish; no further job of the batch is started
    /// until the batch is resumed.
    pub async fn halt_batch(&self, batch_name: &str) -> Result<()> {
        self.store.set_batch_halted(batch_name, true).await?;
        info!("Halted batch {}", batch_name);
        Ok(())
    }

    pub async fn resume_batch(&self, batch_name: &str) -> Result<()> {
        self.store.set_batch_halted(batch_name, false).await?;
        info!("Resumed batch {}", batch_name);
        Ok(())
    }

    pub async fn is_batch_halted(&self, batch_name: &str) -> Result<bool> {
        self.store.is_batch_halted(batch_name).await
    }

    // =============================================================================
    // Queries
    // =============================================================================

    /// Jobs of a published batch
    pub async fn get_batch_jobs(&self, batch_name: &str) -> Result<Option<Vec<Job>>> {
        Ok(self
            .store
            .retrieve_batch(batch_name)
            .await?
            .map(|batch| batch.jobs))
    }

    /// Targeted jobs paired with their current status
    pub async fn get_batch_job_statuses(
        &self,
        batch_name: &str,
        job_index: Option<usize>,
    ) -> Result<Option<Vec<JobStatusEntry>>> {
        let Some(batch) = self.store.retrieve_batch(batch_name).await? else {
            return Ok(None);
        };

        let mut entries = Vec::new();
        for (index, job) in select_jobs(batch_name, &batch, job_index)? {
            entries.push(JobStatusEntry {
                job: job.clone(),
                status: self.store.get_job_status(batch_name, index).await?,
            });
        }

        Ok(Some(entries))
    }

    /// Assembled result of a batch
    pub async fn get_batch_results(&self, batch_name: &str) -> Result<Option<AssembledBatchResult>> {
        self.store.get_batch_result(batch_name).await
    }

    /// Console output of a job, as text or (with `return_url`) as a URL
    pub async fn get_batch_job_console_output(
        &self,
        batch_name: &str,
        job_index: usize,
        return_url: bool,
    ) -> Result<Option<String>> {
        if return_url {
            self.store
                .get_job_console_output_url(batch_name, job_index)
                .await
        } else {
            self.store.get_job_console_output(batch_name, job_index).await
        }
    }

    /// Batch names pending on a compute resource
    pub async fn get_batch_names_for_compute_resource(&self, compute_resource: &str) -> Result<Vec<String>> {
        self.store
            .get_batch_names_for_compute_resource(compute_resource)
            .await
    }

    /// Drops a batch from a compute resource's pending set
    pub async fn remove_batch_name_for_compute_resource(&self, compute_resource: &str, batch_name: &str) -> Result<()> {
        self.store
            .remove_batch_name_for_compute_resource(compute_resource, batch_name)
            .await
    }
}

/// Jobs targeted by an optional index filter, paired with their index
fn select_jobs<'a>(
    batch_name: &str,
    batch: &'a Batch,
    job_index: Option<usize>,
) -> Result<Vec<(usize, &'a Job)>> {
    match job_index {
        None => Ok(batch.jobs.iter().enumerate().collect()),
        Some(index) => batch
            .jobs
            .get(index)
            .map(|job| vec![(index, job)])
            .ok_or_else(|| BatchError::JobIndexOutOfRange {
                batch_name: batch_name.to_string(),
                job_index: index,
                num_jobs: batch.len(),
            }),
    }
}

/// Random alphanumeric code identifying one run of a batch
pub fn generate_job_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JOB_CODE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_code_shape() {
        let code = generate_job_code();
        assert_eq!(code.len(), JOB_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(code, generate_job_code());
    }

    #[test]
    fn test_select_jobs() {
        let batch = Batch::new(vec![Job::new("echo", "a"), Job::new("echo", "b")]);

        let all = select_jobs("b1", &batch, None).unwrap();
        assert_eq!(all.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);

        let one = select_jobs("b1", &batch, Some(1)).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].1.label, "b");

        assert!(matches!(
            select_jobs("b1", &batch, Some(2)),
            Err(BatchError::JobIndexOutOfRange { num_jobs: 2, .. })
        ));
    }
}
