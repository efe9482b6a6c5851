//! Execution context for running jobs
//!
//! Handed to a job's `run` callback. Output written through the context ends
//! up in the job's captured console output as well as on the worker console.

use std::sync::Arc;

use crate::service::console::{ConsoleCapture, Stream};

/// Context shared with a job while it runs
pub struct JobContext {
    batch_name: String,
    job_index: usize,
    console: Arc<ConsoleCapture>,
}

impl JobContext {
    /// Creates a new job context
    ///
    /// # Arguments
    /// * `batch_name` - Batch the job belongs to
    /// * `job_index` - Index of the job within the batch
    /// * `console` - Capture receiving the job's output
    pub fn new(batch_name: impl Into<String>, job_index: usize, console: Arc<ConsoleCapture>) -> Self {
        Self {
            batch_name: batch_name.into(),
            job_index,
            console,
        }
    }

    pub fn batch_name(&self) -> &str {
        &self.batch_name
    }

    pub fn job_index(&self) -> usize {
        self.job_index
    }

    /// Prints a line to stdout
    pub fn println(&self, message: impl AsRef<str>) {
        self.console
            .write(Stream::Stdout, &format!("{}\n", message.as_ref()));
    }

    /// Prints a line to stderr
    pub fn eprintln(&self, message: impl AsRef<str>) {
        self.console
            .write(Stream::Stderr, &format!("{}\n", message.as_ref()));
    }

    /// Writes raw text to a stream without adding a newline
    pub fn write(&self, stream: Stream, text: &str) {
        self.console.write(stream, text);
    }
}
