//! Job domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One unit of work within a batch
///
/// A job is identified by its index in the owning batch. `command` names the
/// registered callback pair that prepares and runs it; every other field is an
/// opaque payload only that command knows how to interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub command: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Job {
    /// Creates a job with an empty payload
    pub fn new(command: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            label: label.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Looks up a payload field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Per-job execution status
///
/// A job with no stored status is "unset"; that state is modelled as
/// `Option::<JobStatus>::None` rather than a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ready,
    Running,
    Finished,
    Error,
}

impl JobStatus {
    /// Wire representation stored in the key/value store
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Ready => "ready",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStatusError(pub String);

impl fmt::Display for ParseJobStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job status: {}", self.0)
    }
}

impl std::error::Error for ParseJobStatusError {}

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(JobStatus::Ready),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "error" => Ok(JobStatus::Error),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Formats an optional status the way operators see it in logs
pub fn describe_status(status: Option<JobStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "None".to_string(),
    }
}

/// A job paired with its current status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub job: Job,
    pub status: Option<JobStatus>,
}
