//! Run phase launcher
//!
//! The listener runs a batch's jobs either inside its own process or in a
//! child `batcho run-batch` process, optionally behind a launcher prefix
//! such as `srun -n 1`. A job that crashes a child process cannot take the
//! listener down with it.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{BatchError, Result};
use crate::service::BatchCoordinator;

/// How the run phase of a batch is executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// Call `run_batch` on the listener's own coordinator
    InProcess,
    /// Launch `<prefix...> <program> run-batch <batch> --store-url <url>`
    Subprocess {
        program: PathBuf,
        prefix: Vec<String>,
        store_url: String,
    },
}

impl RunPhase {
    /// Subprocess run phase re-invoking the given `batcho` executable
    pub fn subprocess(program: impl Into<PathBuf>, prefix: Vec<String>, store_url: impl Into<String>) -> Self {
        RunPhase::Subprocess {
            program: program.into(),
            prefix,
            store_url: store_url.into(),
        }
    }

    /// Full argv of the subprocess for a batch (`None` when in-process)
    pub fn command_line(&self, batch_name: &str) -> Option<Vec<String>> {
        match self {
            RunPhase::InProcess => None,
            RunPhase::Subprocess {
                program,
                prefix,
                store_url,
            } => {
                let mut argv = prefix.clone();
                argv.push(program.display().to_string());
                argv.extend([
                    "run-batch".to_string(),
                    batch_name.to_string(),
                    "--store-url".to_string(),
                    store_url.clone(),
                ]);
                Some(argv)
            }
        }
    }

    /// Runs the batch's ready jobs
    pub async fn run(&self, coordinator: &BatchCoordinator, batch_name: &str) -> Result<()> {
        let Some(argv) = self.command_line(batch_name) else {
            if !coordinator.run_batch(batch_name, None).await? {
                return Err(BatchError::RunPhase(format!(
                    "batch {} was halted or could not be retrieved",
                    batch_name
                )));
            }
            return Ok(());
        };

        info!("Launching run phase: {}", argv.join(" "));

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BatchError::RunPhase("empty run-phase command".to_string()))?;

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        debug!("Run phase of {} exited with {}", batch_name, status);

        if !status.success() {
            return Err(BatchError::RunPhase(format!(
                "run-batch {} exited with {}",
                batch_name, status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::service::JobRegistry;
    use batcho_client::MemoryStore;
    use std::sync::Arc;

    fn coordinator() -> BatchCoordinator {
        BatchCoordinator::new(Arc::new(MemoryStore::new()), Arc::new(JobRegistry::new()))
    }

    #[tokio::test]
    async fn test_subprocess_exit_status_decides_outcome() {
        let coordinator = coordinator();

        let ok = RunPhase::subprocess("true", Vec::new(), "http://localhost:8080");
        assert!(ok.run(&coordinator, "b1").await.is_ok());

        let failing = RunPhase::subprocess("false", Vec::new(), "http://localhost:8080");
        let err = failing.run(&coordinator, "b1").await.unwrap_err();
        assert!(matches!(err, BatchError::RunPhase(_)));
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.to_string().contains("run-batch b1 exited"));
    }

    #[tokio::test]
    async fn test_prefix_runs_before_program() {
        let coordinator = coordinator();
        // `env` execs the program that follows it, so its exit status is passed through
        let phase = RunPhase::subprocess("false", vec!["env".to_string()], "http://localhost:8080");
        let err = phase.run(&coordinator, "b1").await.unwrap_err();
        assert!(matches!(err, BatchError::RunPhase(_)));
    }

    #[tokio::test]
    async fn test_in_process_missing_batch_fails() {
        let err = RunPhase::InProcess
            .run(&coordinator(), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::RunPhase(_)));
    }

    #[test]
    fn test_in_process_has_no_command_line() {
        assert_eq!(RunPhase::InProcess.command_line("b1"), None);
    }

    #[test]
    fn test_subprocess_command_line_with_prefix() {
        let phase = RunPhase::subprocess(
            "/usr/local/bin/batcho",
            vec!["srun".to_string(), "-n".to_string(), "1".to_string()],
            "http://store:8080",
        );

        assert_eq!(
            phase.command_line("nightly").unwrap(),
            vec![
                "srun",
                "-n",
                "1",
                "/usr/local/bin/batcho",
                "run-batch",
                "nightly",
                "--store-url",
                "http://store:8080"
            ]
        );
    }

    #[test]
    fn test_subprocess_command_line_without_prefix() {
        let phase = RunPhase::subprocess("batcho", Vec::new(), "http://localhost:8080");
        let argv = phase.command_line("b1").unwrap();
        assert_eq!(argv[0], "batcho");
        assert_eq!(argv.len(), 5);
    }
}
