//! Batch store repository
//!
//! Typed accessors over the shared key/value store, one per record kind:
//! batches, per-job status/lock/result/console output, assembled results,
//! halt flags and compute-resource pending sets.
//!
//! Writes that take a `job_code` follow the guarded-write protocol: the
//! current lock code of the job is re-read first, and the write is skipped
//! (with a warning) unless it matches. A worker that lost ownership of a job
//! can therefore never clobber state written by the new owner.

use batcho_client::KeyValueStore;
use batcho_core::domain::batch::{AssembledBatchResult, Batch};
use batcho_core::domain::job::JobStatus;
use batcho_core::keys::StoreKey;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{BatchError, Result};
use crate::retry::{RetryPolicy, retry_until};

const HALTED: &str = "halt";

/// Store accessors used by the coordinator
#[derive(Clone)]
pub struct BatchStore {
    store: Arc<dyn KeyValueStore>,
    pending_set_retry: RetryPolicy,
}

impl BatchStore {
    /// Wraps a store with the default pending-set retry schedule (200ms, 50 attempts)
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            pending_set_retry: RetryPolicy::fixed(Duration::from_millis(200), 50),
        }
    }

    /// Overrides the retry schedule used for pending-set updates
    pub fn with_pending_set_retry(mut self, policy: RetryPolicy) -> Self {
        self.pending_set_retry = policy;
        self
    }

    /// The underlying key/value store
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    // =============================================================================
    // Batches
    // =============================================================================

    /// Publishes a batch's job list
    pub async fn store_batch(&self, batch_name: &str, batch: &Batch) -> Result<()> {
        let key = StoreKey::batch(batch_name).to_string();
        self.store
            .save_object(&key, &serde_json::to_value(batch)?)
            .await?;
        Ok(())
    }

    /// Loads a batch
    ///
    /// Returns `None` when no batch is published under the name or its object
    /// is not (yet) available. An object without a `jobs` list is corruption
    /// and is reported as an error.
    pub async fn retrieve_batch(&self, batch_name: &str) -> Result<Option<Batch>> {
        let key = StoreKey::batch(batch_name).to_string();

        if self.store.get(&key).await?.is_none() {
            debug!("No batch published under name: {}", batch_name);
            return Ok(None);
        }

        let Some(object) = self.store.load_object(&key).await? else {
            warn!("Unable to load object for batch: {}", batch_name);
            return Ok(None);
        };

        if object.get("jobs").is_none() {
            return Err(BatchError::CorruptBatch {
                batch_name: batch_name.to_string(),
                reason: "object has no jobs field".to_string(),
            });
        }

        serde_json::from_value(object)
            .map(Some)
            .map_err(|e| BatchError::CorruptBatch {
                batch_name: batch_name.to_string(),
                reason: e.to_string(),
            })
    }

    // =============================================================================
    // Job status
    // =============================================================================

    /// Current status of a job (`None` when unset)
    pub async fn get_job_status(&self, batch_name: &str, job_index: usize) -> Result<Option<JobStatus>> {
        let key = StoreKey::job_status(batch_name, job_index).to_string();

        match self.store.get(&key).await? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| BatchError::CorruptBatch {
                    batch_name: batch_name.to_string(),
                    reason: format!("job {}: {}", job_index, e),
                }),
            None => Ok(None),
        }
    }

    /// Sets (or, with `None`, clears) a job's status
    ///
    /// Returns false if the write was skipped because `job_code` no longer
    /// owns the job.
    pub async fn set_job_status(
        &self,
        batch_name: &str,
        job_index: usize,
        status: Option<JobStatus>,
        job_code: Option<&str>,
    ) -> Result<bool> {
        if !self.check_job_code(batch_name, job_index, job_code, "status").await? {
            return Ok(false);
        }

        let key = StoreKey::job_status(batch_name, job_index).to_string();
        self.store
            .set(&key, status.map(|s| s.as_str()), true)
            .await?;
        Ok(true)
    }

    // =============================================================================
    // Job results and console output
    // =============================================================================

    /// Result object of a finished job
    pub async fn get_job_result(&self, batch_name: &str, job_index: usize) -> Result<Option<Value>> {
        let key = StoreKey::job_result(batch_name, job_index).to_string();
        Ok(self.store.load_object(&key).await?)
    }

    /// Stores a job's result (guarded by `job_code`)
    pub async fn set_job_result(
        &self,
        batch_name: &str,
        job_index: usize,
        result: &Value,
        job_code: Option<&str>,
    ) -> Result<bool> {
        if !self.check_job_code(batch_name, job_index, job_code, "result").await? {
            return Ok(false);
        }

        let key = StoreKey::job_result(batch_name, job_index).to_string();
        self.store.save_object(&key, result).await?;
        Ok(true)
    }

    /// Uploads a job's captured console output (guarded by `job_code`)
    pub async fn set_job_console_output(
        &self,
        batch_name: &str,
        job_index: usize,
        file_name: &Path,
        job_code: Option<&str>,
    ) -> Result<bool> {
        if !self
            .check_job_code(batch_name, job_index, job_code, "console output")
            .await?
        {
            return Ok(false);
        }

        let key = StoreKey::job_console_output(batch_name, job_index).to_string();
        self.store.save_file(&key, file_name).await?;
        Ok(true)
    }

    /// Text of a job's captured console output
    pub async fn get_job_console_output(&self, batch_name: &str, job_index: usize) -> Result<Option<String>> {
        let key = StoreKey::job_console_output(batch_name, job_index).to_string();

        match self.store.realize_file(&key).await? {
            Some(path) => Ok(Some(tokio::fs::read_to_string(path).await?)),
            None => Ok(None),
        }
    }

    /// URL of a job's captured console output
    pub async fn get_job_console_output_url(
        &self,
        batch_name: &str,
        job_index: usize,
    ) -> Result<Option<String>> {
        let key = StoreKey::job_console_output(batch_name, job_index).to_string();
        Ok(self.store.find_file(&key).await?)
    }

    // =============================================================================
    // Job locks
    // =============================================================================

    /// Tries to take the execution lock of a job
    ///
    /// Set-if-absent on the lock key; returns whether `job_code` now holds
    /// the lock.
    pub async fn acquire_job_lock(&self, batch_name: &str, job_index: usize, job_code: &str) -> Result<bool> {
        let key = StoreKey::job_lock(batch_name, job_index).to_string();

        if !self.store.set(&key, Some(job_code), false).await? {
            return Ok(false);
        }

        Ok(self.store.get(&key).await?.as_deref() == Some(job_code))
    }

    /// Code of the worker currently holding a job's lock
    pub async fn get_job_lock_code(&self, batch_name: &str, job_index: usize) -> Result<Option<String>> {
        let key = StoreKey::job_lock(batch_name, job_index).to_string();
        Ok(self.store.get(&key).await?)
    }

    /// Releases a job's lock regardless of who holds it
    pub async fn clear_job_lock(&self, batch_name: &str, job_index: usize) -> Result<()> {
        let key = StoreKey::job_lock(batch_name, job_index).to_string();
        self.store.set(&key, None, true).await?;
        Ok(())
    }

    // =============================================================================
    // Assembled results and halt flags
    // =============================================================================

    /// Stores the assembled result of a batch
    pub async fn set_batch_result(&self, batch_name: &str, result: &AssembledBatchResult) -> Result<()> {
        let key = StoreKey::batch_result(batch_name).to_string();
        self.store
            .save_object(&key, &serde_json::to_value(result)?)
            .await?;
        Ok(())
    }

    /// Assembled result of a batch, if it has been assembled
    pub async fn get_batch_result(&self, batch_name: &str) -> Result<Option<AssembledBatchResult>> {
        let key = StoreKey::batch_result(batch_name).to_string();

        match self.store.load_object(&key).await? {
            Some(object) => serde_json::from_value(object)
                .map(Some)
                .map_err(|e| BatchError::CorruptBatch {
                    batch_name: batch_name.to_string(),
                    reason: format!("assembled result: {}", e),
                }),
            None => Ok(None),
        }
    }

    /// Raises or lowers the halt flag of a batch
    pub async fn set_batch_halted(&self, batch_name: &str, halted: bool) -> Result<()> {
        let key = StoreKey::batch_halt(batch_name).to_string();
        self.store
            .set(&key, halted.then_some(HALTED), true)
            .await?;
        Ok(())
    }

    /// Whether the halt flag of a batch is raised
    pub async fn is_batch_halted(&self, batch_name: &str) -> Result<bool> {
        let key = StoreKey::batch_halt(batch_name).to_string();
        Ok(self.store.get(&key).await?.is_some())
    }

    // =============================================================================
    // Compute-resource pending sets
    // =============================================================================

    /// Batch names currently pending on a compute resource
    pub async fn get_batch_names_for_compute_resource(&self, compute_resource: &str) -> Result<Vec<String>> {
        let key = StoreKey::compute_resource_batch_names(compute_resource).to_string();
        let raw = self.store.get(&key).await?;
        parse_batch_names(compute_resource, raw.as_deref())
    }

    /// Adds a batch name to a compute resource's pending set
    pub async fn add_batch_name_for_compute_resource(&self, compute_resource: &str, batch_name: &str) -> Result<()> {
        self.update_pending_set(compute_resource, |names| {
            if names.iter().any(|name| name == batch_name) {
                return false;
            }
            names.push(batch_name.to_string());
            true
        })
        .await
    }

    /// Removes a batch name from a compute resource's pending set
    pub async fn remove_batch_name_for_compute_resource(&self, compute_resource: &str, batch_name: &str) -> Result<()> {
        self.update_pending_set(compute_resource, |names| {
            let before = names.len();
            names.retain(|name| name != batch_name);
            names.len() != before
        })
        .await
    }

    /// Read-modify-write of a pending set, retried on concurrent modification
    ///
    /// `modify` returns false when the set already has the desired content.
    async fn update_pending_set<F>(&self, compute_resource: &str, modify: F) -> Result<()>
    where
        F: Fn(&mut Vec<String>) -> bool,
    {
        let key = StoreKey::compute_resource_batch_names(compute_resource).to_string();
        let key = key.as_str();
        let store = &self.store;
        let modify = &modify;

        let done = retry_until::<(), BatchError, _, _>(&self.pending_set_retry, |attempt| async move {
            let current = store.get(key).await?;
            let mut names = parse_batch_names(compute_resource, current.as_deref())?;

            if !modify(&mut names) {
                return Ok(Some(()));
            }

            let updated = if names.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&names)?)
            };

            if store
                .compare_and_set(key, current.as_deref(), updated.as_deref())
                .await?
            {
                Ok(Some(()))
            } else {
                debug!(
                    "Pending set of {} changed concurrently (attempt {})",
                    compute_resource, attempt
                );
                Ok(None)
            }
        })
        .await?;

        done.ok_or_else(|| BatchError::PendingSetConflict {
            compute_resource: compute_resource.to_string(),
        })
    }

    // =============================================================================
    // Guarded writes
    // =============================================================================

    /// Checks that `job_code` (if given) still owns the job's lock
    async fn check_job_code(
        &self,
        batch_name: &str,
        job_index: usize,
        job_code: Option<&str>,
        what: &str,
    ) -> Result<bool> {
        let Some(job_code) = job_code else {
            return Ok(true);
        };

        let current = self.get_job_lock_code(batch_name, job_index).await?;
        if current.as_deref() != Some(job_code) {
            warn!(
                "Not setting job {} for {}/{}: job code {} does not match lock {:?}",
                what, batch_name, job_index, job_code, current
            );
            return Ok(false);
        }

        Ok(true)
    }
}

fn parse_batch_names(compute_resource: &str, raw: Option<&str>) -> Result<Vec<String>> {
    match raw {
        Some(raw) => serde_json::from_str(raw).map_err(|e| BatchError::CorruptPendingSet {
            compute_resource: compute_resource.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use batcho_client::MemoryStore;
    use batcho_core::domain::job::Job;
    use serde_json::json;

    fn batch_store() -> BatchStore {
        BatchStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_retrieve_missing_batch_is_none() {
        let store = batch_store();
        assert!(store.retrieve_batch("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retrieve_batch_without_jobs_is_corrupt() {
        let store = batch_store();
        let key = StoreKey::batch("b1").to_string();
        store
            .kv()
            .save_object(&key, &json!({ "not_jobs": [] }))
            .await
            .unwrap();

        match store.retrieve_batch("b1").await {
            Err(BatchError::CorruptBatch { batch_name, .. }) => assert_eq!(batch_name, "b1"),
            other => panic!("expected CorruptBatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retrieve_dangling_pointer_is_none() {
        let store = batch_store();
        let key = StoreKey::batch("b1").to_string();
        let address = format!("sha256://{}", "0".repeat(64));
        store.kv().set(&key, Some(&address), true).await.unwrap();

        assert!(store.retrieve_batch("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_and_retrieve_batch() {
        let store = batch_store();
        let batch = Batch::new(vec![Job::new("echo", "a").with_field("x", 1)]);

        store.store_batch("b1", &batch).await.unwrap();
        assert_eq!(store.retrieve_batch("b1").await.unwrap(), Some(batch));
    }

    #[tokio::test]
    async fn test_guarded_status_write_rejects_other_code() {
        let store = batch_store();
        assert!(store.acquire_job_lock("b1", 0, "AAAA").await.unwrap());
        store
            .set_job_status("b1", 0, Some(JobStatus::Running), Some("AAAA"))
            .await
            .unwrap();

        let written = store
            .set_job_status("b1", 0, Some(JobStatus::Finished), Some("BBBB"))
            .await
            .unwrap();

        assert!(!written);
        assert_eq!(
            store.get_job_status("b1", 0).await.unwrap(),
            Some(JobStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_guarded_result_write_requires_lock() {
        let store = batch_store();

        let written = store
            .set_job_result("b1", 0, &json!(42), Some("AAAA"))
            .await
            .unwrap();

        assert!(!written);
        assert_eq!(store.get_job_result("b1", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_cleared() {
        let store = batch_store();

        assert!(store.acquire_job_lock("b1", 0, "AAAA").await.unwrap());
        assert!(!store.acquire_job_lock("b1", 0, "BBBB").await.unwrap());
        assert_eq!(
            store.get_job_lock_code("b1", 0).await.unwrap().as_deref(),
            Some("AAAA")
        );

        store.clear_job_lock("b1", 0).await.unwrap();
        assert!(store.acquire_job_lock("b1", 0, "BBBB").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_lock_attempts_have_one_winner() {
        let store = batch_store();

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .acquire_job_lock("b1", 3, &format!("code{}", i))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_unparseable_status_is_corruption() {
        let store = batch_store();
        let key = StoreKey::job_status("b1", 0).to_string();
        store.kv().set(&key, Some("bogus"), true).await.unwrap();

        assert!(matches!(
            store.get_job_status("b1", 0).await,
            Err(BatchError::CorruptBatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_pending_set_add_and_remove() {
        let store = batch_store();

        store
            .add_batch_name_for_compute_resource("cr", "b1")
            .await
            .unwrap();
        store
            .add_batch_name_for_compute_resource("cr", "b2")
            .await
            .unwrap();
        store
            .add_batch_name_for_compute_resource("cr", "b1")
            .await
            .unwrap();
        assert_eq!(
            store.get_batch_names_for_compute_resource("cr").await.unwrap(),
            vec!["b1", "b2"]
        );

        store
            .remove_batch_name_for_compute_resource("cr", "b1")
            .await
            .unwrap();
        store
            .remove_batch_name_for_compute_resource("cr", "missing")
            .await
            .unwrap();
        assert_eq!(
            store.get_batch_names_for_compute_resource("cr").await.unwrap(),
            vec!["b2"]
        );

        store
            .remove_batch_name_for_compute_resource("cr", "b2")
            .await
            .unwrap();
        assert!(
            store
                .get_batch_names_for_compute_resource("cr")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_unparseable_pending_set_names_compute_resource() {
        let store = batch_store();
        let key = StoreKey::compute_resource_batch_names("gpu").to_string();
        store.kv().set(&key, Some("not a list"), true).await.unwrap();

        let err = store
            .get_batch_names_for_compute_resource("gpu")
            .await
            .unwrap_err();
        match &err {
            BatchError::CorruptPendingSet { compute_resource, .. } => assert_eq!(compute_resource, "gpu"),
            other => panic!("expected CorruptPendingSet, got {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(
            store
                .add_batch_name_for_compute_resource("gpu", "b1")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_concurrent_pending_set_appends_are_not_lost() {
        let store = batch_store()
            .with_pending_set_retry(RetryPolicy::fixed(Duration::from_millis(1), 1000));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .add_batch_name_for_compute_resource("cr", &format!("b{}", i))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut names = store.get_batch_names_for_compute_resource("cr").await.unwrap();
        names.sort();
        assert_eq!(names.len(), 8);
    }

    #[tokio::test]
    async fn test_halt_flag() {
        let store = batch_store();
        assert!(!store.is_batch_halted("b1").await.unwrap());

        store.set_batch_halted("b1", true).await.unwrap();
        assert!(store.is_batch_halted("b1").await.unwrap());

        store.set_batch_halted("b1", false).await.unwrap();
        assert!(!store.is_batch_halted("b1").await.unwrap());
    }
}
