//! Store key schema
//!
//! Every record the coordinator keeps in the shared store lives under a key
//! built here, so readers and writers on different hosts agree on the layout.

use std::fmt;

/// Prefix shared by every key written by batcho
pub const NAMESPACE: &str = "batcho";

/// A structured key in the shared store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Pointer to the batch object (the job list)
    Batch { batch_name: String },
    /// Status string of one job
    JobStatus { batch_name: String, job_index: usize },
    /// Lock code of whichever worker owns one job
    JobLock { batch_name: String, job_index: usize },
    /// Pointer to one job's result object
    JobResult { batch_name: String, job_index: usize },
    /// Pointer to one job's captured console output
    JobConsoleOutput { batch_name: String, job_index: usize },
    /// Pointer to the assembled result of the whole batch
    BatchResult { batch_name: String },
    /// Cooperative halt flag for a batch
    BatchHalt { batch_name: String },
    /// JSON array of batch names pending on a compute resource
    ComputeResourceBatchNames { compute_resource: String },
}

impl StoreKey {
    pub fn batch(batch_name: &str) -> Self {
        Self::Batch {
            batch_name: batch_name.to_string(),
        }
    }

    pub fn job_status(batch_name: &str, job_index: usize) -> Self {
        Self::JobStatus {
            batch_name: batch_name.to_string(),
            job_index,
        }
    }

    pub fn job_lock(batch_name: &str, job_index: usize) -> Self {
        Self::JobLock {
            batch_name: batch_name.to_string(),
            job_index,
        }
    }

    pub fn job_result(batch_name: &str, job_index: usize) -> Self {
        Self::JobResult {
            batch_name: batch_name.to_string(),
            job_index,
        }
    }

    pub fn job_console_output(batch_name: &str, job_index: usize) -> Self {
        Self::JobConsoleOutput {
            batch_name: batch_name.to_string(),
            job_index,
        }
    }

    pub fn batch_result(batch_name: &str) -> Self {
        Self::BatchResult {
            batch_name: batch_name.to_string(),
        }
    }

    pub fn batch_halt(batch_name: &str) -> Self {
        Self::BatchHalt {
            batch_name: batch_name.to_string(),
        }
    }

    pub fn compute_resource_batch_names(compute_resource: &str) -> Self {
        Self::ComputeResourceBatchNames {
            compute_resource: compute_resource.to_string(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Batch { batch_name } => write!(f, "{NAMESPACE}/batch/{batch_name}"),
            StoreKey::JobStatus {
                batch_name,
                job_index,
            } => write!(f, "{NAMESPACE}/job_status/{batch_name}/{job_index}"),
            StoreKey::JobLock {
                batch_name,
                job_index,
            } => write!(f, "{NAMESPACE}/job_lock/{batch_name}/{job_index}"),
            StoreKey::JobResult {
                batch_name,
                job_index,
            } => write!(f, "{NAMESPACE}/job_result/{batch_name}/{job_index}"),
            StoreKey::JobConsoleOutput {
                batch_name,
                job_index,
            } => write!(f, "{NAMESPACE}/job_console_output/{batch_name}/{job_index}"),
            StoreKey::BatchResult { batch_name } => {
                write!(f, "{NAMESPACE}/batch_result/{batch_name}")
            }
            StoreKey::BatchHalt { batch_name } => write!(f, "{NAMESPACE}/batch_halt/{batch_name}"),
            StoreKey::ComputeResourceBatchNames { compute_resource } => {
                write!(
                    f,
                    "{NAMESPACE}/compute_resource_batch_names/{compute_resource}"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_keys_are_distinct_per_record_kind() {
        let keys = [
            StoreKey::job_status("b1", 0).to_string(),
            StoreKey::job_lock("b1", 0).to_string(),
            StoreKey::job_result("b1", 0).to_string(),
            StoreKey::job_console_output("b1", 0).to_string(),
        ];

        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(StoreKey::batch("b1").to_string(), "batcho/batch/b1");
        assert_eq!(
            StoreKey::job_status("b1", 3).to_string(),
            "batcho/job_status/b1/3"
        );
        assert_eq!(
            StoreKey::compute_resource_batch_names("cluster-a").to_string(),
            "batcho/compute_resource_batch_names/cluster-a"
        );
    }
}
