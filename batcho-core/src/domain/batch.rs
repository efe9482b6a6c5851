//! Batch domain types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::job::Job;

/// An ordered list of jobs published under a batch name
///
/// The job list is immutable once published; per-job mutable state lives in
/// separate store records keyed by batch name and job index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub jobs: Vec<Job>,
}

impl Batch {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// One job's entry in an assembled batch result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobResult {
    pub job: Job,
    pub result: Value,
}

/// Results of every job of a completed batch, in job order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledBatchResult {
    pub results: Vec<BatchJobResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assembled_result_shape() {
        let assembled = AssembledBatchResult {
            results: vec![BatchJobResult {
                job: Job::new("echo", "hello"),
                result: json!("hello"),
            }],
        };

        let value = serde_json::to_value(&assembled).unwrap();
        assert_eq!(
            value,
            json!({
                "results": [
                    { "job": { "command": "echo", "label": "hello" }, "result": "hello" }
                ]
            })
        );
    }
}
