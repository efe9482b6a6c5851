//! Job registry service
//!
//! Maps command names to the callbacks that prepare and run jobs. The
//! embedding application fills the registry once at startup and hands it to
//! the coordinator, which only ever reads it.

use async_trait::async_trait;
use batcho_core::domain::job::Job;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::JobContext;
use crate::error::BatchError;

/// Callback pair implementing one job command
#[async_trait]
pub trait JobCommand: Send + Sync {
    /// Per-job setup, run once before the job becomes `ready`
    async fn prepare(&self, job: &Job) -> anyhow::Result<()>;

    /// Executes the job and returns its result
    async fn run(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<Value>;
}

/// Job command built from two synchronous closures
pub struct FnCommand<P, R> {
    prepare: P,
    run: R,
}

impl<P, R> FnCommand<P, R>
where
    P: Fn(&Job) -> anyhow::Result<()> + Send + Sync,
    R: Fn(&Job, &JobContext) -> anyhow::Result<Value> + Send + Sync,
{
    pub fn new(prepare: P, run: R) -> Self {
        Self { prepare, run }
    }
}

#[async_trait]
impl<P, R> JobCommand for FnCommand<P, R>
where
    P: Fn(&Job) -> anyhow::Result<()> + Send + Sync,
    R: Fn(&Job, &JobContext) -> anyhow::Result<Value> + Send + Sync,
{
    async fn prepare(&self, job: &Job) -> anyhow::Result<()> {
        (self.prepare)(job)
    }

    async fn run(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<Value> {
        (self.run)(job, ctx)
    }
}

/// Command name to callback mapping
#[derive(Clone, Default)]
pub struct JobRegistry {
    commands: HashMap<String, Arc<dyn JobCommand>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command, replacing any earlier registration of the same name
    pub fn register_job_command(
        &mut self,
        command: impl Into<String>,
        handler: impl JobCommand + 'static,
    ) -> &mut Self {
        self.commands.insert(command.into(), Arc::new(handler));
        self
    }

    /// Registers a command from a `prepare` and a `run` closure
    pub fn register_fn<P, R>(&mut self, command: impl Into<String>, prepare: P, run: R) -> &mut Self
    where
        P: Fn(&Job) -> anyhow::Result<()> + Send + Sync + 'static,
        R: Fn(&Job, &JobContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_job_command(command, FnCommand::new(prepare, run))
    }

    /// Looks up a command by name
    pub fn get(&self, command: &str) -> Option<Arc<dyn JobCommand>> {
        self.commands.get(command).cloned()
    }

    /// Looks up the command for a job, failing if it is not registered
    pub fn lookup(&self, job: &Job) -> Result<Arc<dyn JobCommand>, BatchError> {
        self.get(&job.command)
            .ok_or_else(|| BatchError::UnknownCommand {
                label: job.label.clone(),
                command: job.command.clone(),
            })
    }

    /// Registered command names, sorted
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::console::ConsoleCapture;
    use serde_json::json;

    fn ctx() -> JobContext {
        JobContext::new("b1", 0, Arc::new(ConsoleCapture::new()))
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = JobRegistry::new();
        registry
            .register_fn("echo", |_| Ok(()), |_, _| Ok(json!("first")))
            .register_fn("echo", |_| Ok(()), |_, _| Ok(json!("second")));

        let job = Job::new("echo", "a");
        let command = registry.lookup(&job).unwrap();

        assert_eq!(command.run(&job, &ctx()).await.unwrap(), json!("second"));
        assert_eq!(registry.command_names(), vec!["echo"]);
    }

    #[test]
    fn test_unknown_command_names_job() {
        let registry = JobRegistry::new();
        let job = Job::new("sort", "recording 7");

        match registry.lookup(&job) {
            Err(BatchError::UnknownCommand { label, command }) => {
                assert_eq!(label, "recording 7");
                assert_eq!(command, "sort");
            }
            _ => panic!("expected UnknownCommand"),
        }
    }
}
