//! Built-in job commands
//!
//! - `echo`: result is the job's `message` field, or its label
//! - `shell`: runs the job's `script` field with `sh -c`

use anyhow::{Context as _, anyhow, bail};
use async_trait::async_trait;
use batcho_core::domain::job::Job;
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::context::JobContext;
use crate::service::console::Stream;
use crate::service::registry::{JobCommand, JobRegistry};

/// Registers `echo` and `shell`
pub fn register_builtin_commands(registry: &mut JobRegistry) -> &mut JobRegistry {
    registry
        .register_job_command("echo", EchoCommand)
        .register_job_command("shell", ShellCommand)
}

pub struct EchoCommand;

#[async_trait]
impl JobCommand for EchoCommand {
    async fn prepare(&self, _job: &Job) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<Value> {
        let message = match job.field("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => job.label.clone(),
        };

        ctx.println(&message);
        Ok(Value::String(message))
    }
}

pub struct ShellCommand;

impl ShellCommand {
    fn script(job: &Job) -> anyhow::Result<&str> {
        job.field("script")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("job {} has no string field 'script'", job.label))
    }
}

#[async_trait]
impl JobCommand for ShellCommand {
    async fn prepare(&self, job: &Job) -> anyhow::Result<()> {
        Self::script(job).map(|_| ())
    }

    async fn run(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<Value> {
        let script = Self::script(job)?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn sh")?;

        let stdout = child.stdout.take().context("stdout not captured")?;
        let stderr = child.stderr.take().context("stderr not captured")?;

        let (out, err) = tokio::join!(
            forward_lines(stdout, Stream::Stdout, ctx),
            forward_lines(stderr, Stream::Stderr, ctx)
        );
        out?;
        err?;

        let status = child.wait().await.context("Failed to wait for sh")?;
        let exit_code = status.code().unwrap_or(-1);

        if !status.success() {
            bail!("script exited with status {}", exit_code);
        }

        Ok(json!({ "exit_code": exit_code }))
    }
}

async fn forward_lines<R>(reader: R, stream: Stream, ctx: &JobContext) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        ctx.write(stream, &format!("{}\n", line));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::console::ConsoleCapture;
    use std::sync::Arc;

    fn capture_ctx() -> (Arc<ConsoleCapture>, JobContext) {
        let console = Arc::new(ConsoleCapture::new());
        console.start_writing_to_file().unwrap();
        let ctx = JobContext::new("b1", 0, Arc::clone(&console));
        (console, ctx)
    }

    #[tokio::test]
    async fn test_echo_prefers_message_over_label() {
        let (console, ctx) = capture_ctx();

        let job = Job::new("echo", "greeting").with_field("message", "hello");
        assert_eq!(EchoCommand.run(&job, &ctx).await.unwrap(), json!("hello"));

        let job = Job::new("echo", "greeting");
        assert_eq!(EchoCommand.run(&job, &ctx).await.unwrap(), json!("greeting"));

        let file = console.stop_writing_to_file().unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello\ngreeting\n");
    }

    #[tokio::test]
    async fn test_shell_captures_both_streams() {
        let (console, ctx) = capture_ctx();
        let job = Job::new("shell", "s").with_field("script", "echo out; echo err >&2");

        let result = ShellCommand.run(&job, &ctx).await.unwrap();
        assert_eq!(result, json!({ "exit_code": 0 }));

        let file = console.stop_writing_to_file().unwrap();
        let output = std::fs::read_to_string(&file).unwrap();
        assert!(output.contains("out\n"));
        assert!(output.contains("err\n"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_fails() {
        let (_console, ctx) = capture_ctx();
        let job = Job::new("shell", "s").with_field("script", "exit 3");

        let err = ShellCommand.run(&job, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("3"));
    }

    #[tokio::test]
    async fn test_shell_prepare_requires_script() {
        let job = Job::new("shell", "s");
        assert!(ShellCommand.prepare(&job).await.is_err());
    }

    #[test]
    fn test_register_builtin_commands() {
        let mut registry = JobRegistry::new();
        register_builtin_commands(&mut registry);
        assert_eq!(registry.command_names(), vec!["echo", "shell"]);
    }
}
