//! Error types for batch coordination

use batcho_client::StoreError;
use batcho_core::domain::job::{JobStatus, describe_status};
use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Boxed error returned by job callbacks
pub type JobFailure = Box<dyn std::error::Error + Send + Sync>;

/// Broad classification of a [`BatchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misconfiguration that retrying cannot fix (e.g. unregistered command)
    Configuration,
    /// Store contents are inconsistent
    Corruption,
    /// A job's prepare or run callback failed
    Execution,
    /// The batch is not ready for the requested operation
    Incomplete,
    /// The store could not be reached or refused the request
    Store,
}

/// Errors raised by batch-level operations
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No command '{command}' registered for job: {label}")]
    UnknownCommand { label: String, command: String },

    #[error("Batch {batch_name} is corrupt: {reason}")]
    CorruptBatch { batch_name: String, reason: String },

    #[error("Job index {job_index} is out of range for batch {batch_name} ({num_jobs} jobs)")]
    JobIndexOutOfRange {
        batch_name: String,
        job_index: usize,
        num_jobs: usize,
    },

    #[error("Error preparing job {label}: {source}")]
    PrepareFailed {
        label: String,
        #[source]
        source: JobFailure,
    },

    #[error("Error running job {label}: {source}")]
    RunFailed {
        label: String,
        #[source]
        source: JobFailure,
    },

    #[error("Run phase failed: {0}")]
    RunPhase(String),

    #[error("Job not finished: {label} (status: {})", status_name(.status))]
    Incomplete {
        label: String,
        status: Option<JobStatus>,
    },

    #[error("Finished job has no stored result: {label}")]
    MissingResult { label: String },

    #[error("Pending batches of compute resource {compute_resource} are corrupt: {reason}")]
    CorruptPendingSet {
        compute_resource: String,
        reason: String,
    },

    #[error("Gave up updating pending batches of compute resource {compute_resource}")]
    PendingSetConflict { compute_resource: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_name(status: &Option<JobStatus>) -> String {
    describe_status(*status)
}

impl BatchError {
    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::UnknownCommand { .. } | BatchError::JobIndexOutOfRange { .. } => {
                ErrorKind::Configuration
            }
            BatchError::CorruptBatch { .. }
            | BatchError::CorruptPendingSet { .. }
            | BatchError::MissingResult { .. } => ErrorKind::Corruption,
            BatchError::PrepareFailed { .. }
            | BatchError::RunFailed { .. }
            | BatchError::RunPhase(_) => ErrorKind::Execution,
            BatchError::Incomplete { .. } => ErrorKind::Incomplete,
            BatchError::PendingSetConflict { .. } | BatchError::Store(_) | BatchError::Io(_) => {
                ErrorKind::Store
            }
        }
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Store(StoreError::Serialization(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_names_unset_status() {
        let err = BatchError::Incomplete {
            label: "job b".to_string(),
            status: None,
        };
        assert_eq!(err.to_string(), "Job not finished: job b (status: None)");
        assert_eq!(err.kind(), ErrorKind::Incomplete);
    }

    #[test]
    fn test_run_failure_keeps_source() {
        let err = BatchError::RunFailed {
            label: "a".to_string(),
            source: anyhow::anyhow!("boom").into(),
        };
        assert_eq!(err.to_string(), "Error running job a: boom");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_unknown_command_is_configuration() {
        let err = BatchError::UnknownCommand {
            label: "a".to_string(),
            command: "missing".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
