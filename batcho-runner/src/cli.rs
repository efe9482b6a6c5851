//! Operator command line
//!
//! Subcommands map one-to-one onto coordinator operations, plus `listen`
//! which runs the compute-resource loop until Ctrl-C.

use anyhow::{Context, Result, bail};
use batcho_core::domain::batch::Batch;
use batcho_core::domain::job::{Job, JobStatus, JobStatusEntry, describe_status};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::scheduler::{ComputeResourceListener, RunPhase};
use crate::service::BatchCoordinator;

#[derive(Parser)]
#[command(name = "batcho")]
#[command(about = "Distributed batch job coordination", long_about = None)]
pub struct Cli {
    /// Store URL
    #[arg(long, global = true, env = "BATCHO_STORE_URL")]
    pub store_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Poll a compute resource for batches and handle them
    Listen {
        /// Compute resource to listen as
        #[arg(long, env = "BATCHO_COMPUTE_RESOURCE")]
        compute_resource: Option<String>,

        /// Launcher prefix for the run phase (e.g. "srun -n 1")
        #[arg(long, env = "BATCHO_RUN_PREFIX")]
        run_prefix: Option<String>,

        /// Run jobs inside the listener instead of a child process
        #[arg(long)]
        in_process: bool,
    },
    /// Publish a batch from a JSON file of jobs
    SetBatch {
        name: String,

        /// JSON array of jobs, or an object with a "jobs" array
        jobs_file: PathBuf,

        /// Queue the batch on this compute resource
        #[arg(long)]
        compute_resource: Option<String>,
    },
    /// Run the prepare phase of a batch
    PrepareBatch {
        name: String,

        /// Clear unfinished jobs before preparing them
        #[arg(long)]
        clear: bool,

        #[arg(long)]
        job_index: Option<usize>,
    },
    /// Run the ready jobs of a batch
    RunBatch {
        name: String,

        #[arg(long)]
        job_index: Option<usize>,
    },
    /// Collect the results of a finished batch
    AssembleBatch { name: String },
    /// Reset job statuses and locks
    ClearBatch {
        name: String,

        #[arg(long)]
        job_index: Option<usize>,
    },
    /// Show job statuses
    Status {
        name: String,

        #[arg(long)]
        job_index: Option<usize>,
    },
    /// Show the assembled result of a batch
    Results { name: String },
    /// Show the captured console output of a job
    ConsoleOutput {
        name: String,
        job_index: usize,

        /// Print the output's URL instead of its text
        #[arg(long)]
        url: bool,
    },
    /// Stop starting new jobs of a batch
    Halt { name: String },
    /// Allow a halted batch to run again
    Resume { name: String },
    /// List batches pending on a compute resource
    Pending { compute_resource: String },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `coordinator` - Coordinator bound to the configured store
/// * `config` - Worker configuration (after CLI overrides)
pub async fn handle_command(command: Commands, coordinator: Arc<BatchCoordinator>, config: &Config) -> Result<()> {
    match command {
        Commands::Listen {
            compute_resource,
            run_prefix,
            in_process,
        } => listen(coordinator, config, compute_resource, run_prefix, in_process).await,
        Commands::SetBatch {
            name,
            jobs_file,
            compute_resource,
        } => set_batch(&coordinator, &name, &jobs_file, compute_resource.as_deref()).await,
        Commands::PrepareBatch {
            name,
            clear,
            job_index,
        } => {
            require_batch(coordinator.prepare_batch(&name, clear, job_index).await?, &name)?;
            println!("{}", format!("✓ Prepared batch {}", name).green());
            Ok(())
        }
        Commands::RunBatch { name, job_index } => {
            if !coordinator.run_batch(&name, job_index).await? {
                bail!("Batch {} was not run (missing or halted)", name);
            }
            println!("{}", format!("✓ Ran batch {}", name).green());
            Ok(())
        }
        Commands::AssembleBatch { name } => {
            require_batch(coordinator.assemble_batch(&name).await?, &name)?;
            println!("{}", format!("✓ Assembled batch {}", name).green());
            Ok(())
        }
        Commands::ClearBatch { name, job_index } => {
            require_batch(coordinator.clear_batch_jobs(&name, job_index).await?, &name)?;
            println!("{}", format!("✓ Cleared batch {}", name).green());
            Ok(())
        }
        Commands::Status { name, job_index } => show_status(&coordinator, &name, job_index).await,
        Commands::Results { name } => show_results(&coordinator, &name).await,
        Commands::ConsoleOutput {
            name,
            job_index,
            url,
        } => {
            match coordinator
                .get_batch_job_console_output(&name, job_index, url)
                .await?
            {
                Some(output) => print!("{}", output),
                None => println!("{}", "No console output recorded for this job.".yellow()),
            }
            Ok(())
        }
        Commands::Halt { name } => {
            coordinator.halt_batch(&name).await?;
            println!("{}", format!("✓ Halted batch {}", name).yellow());
            Ok(())
        }
        Commands::Resume { name } => {
            coordinator.resume_batch(&name).await?;
            println!("{}", format!("✓ Resumed batch {}", name).green());
            Ok(())
        }
        Commands::Pending { compute_resource } => {
            let names = coordinator
                .get_batch_names_for_compute_resource(&compute_resource)
                .await?;
            if names.is_empty() {
                println!("{}", "No pending batches.".yellow());
            } else {
                println!("{}", format!("{} pending batch(es):", names.len()).bold());
                for name in names {
                    println!("  {}", name);
                }
            }
            Ok(())
        }
    }
}

async fn listen(
    coordinator: Arc<BatchCoordinator>,
    config: &Config,
    compute_resource: Option<String>,
    run_prefix: Option<String>,
    in_process: bool,
) -> Result<()> {
    let Some(compute_resource) = compute_resource.or_else(|| config.compute_resource.clone()) else {
        bail!("No compute resource given (use --compute-resource or BATCHO_COMPUTE_RESOURCE)");
    };

    let run_phase = if in_process {
        RunPhase::InProcess
    } else {
        let mut config = config.clone();
        if run_prefix.is_some() {
            config.run_prefix = run_prefix;
        }
        let program = std::env::current_exe().context("Failed to locate the batcho executable")?;
        RunPhase::subprocess(program, config.run_prefix_args(), config.store_url.clone())
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    let mut listener =
        ComputeResourceListener::new(compute_resource, coordinator, run_phase, config.poll_interval);
    listener.run(shutdown).await;

    Ok(())
}

async fn set_batch(
    coordinator: &BatchCoordinator,
    name: &str,
    jobs_file: &Path,
    compute_resource: Option<&str>,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(jobs_file)
        .await
        .with_context(|| format!("Failed to read {}", jobs_file.display()))?;
    let jobs = parse_jobs(&raw).with_context(|| format!("Invalid jobs file {}", jobs_file.display()))?;
    let count = jobs.len();

    coordinator.set_batch(name, jobs, compute_resource).await?;

    println!(
        "{}",
        format!("✓ Published batch {} with {} job(s)", name, count).green()
    );
    if let Some(resource) = compute_resource {
        println!("  Queued on compute resource: {}", resource.cyan());
    }
    Ok(())
}

/// Parses a jobs file: a bare array of jobs or a `{"jobs": [...]}` object
pub fn parse_jobs(raw: &str) -> Result<Vec<Job>> {
    let value: Value = serde_json::from_str(raw)?;

    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }

    let batch: Batch = serde_json::from_value(value)?;
    Ok(batch.jobs)
}

async fn show_status(coordinator: &BatchCoordinator, name: &str, job_index: Option<usize>) -> Result<()> {
    let Some(entries) = coordinator.get_batch_job_statuses(name, job_index).await? else {
        bail!("Batch {} not found", name);
    };

    if coordinator.is_batch_halted(name).await? {
        println!("{}", format!("Batch {} is halted", name).yellow().bold());
    }

    println!("{}", format!("Batch {} ({} job(s)):", name, entries.len()).bold());
    println!();
    for (index, entry) in entries.iter().enumerate() {
        let index = job_index.unwrap_or(index);
        print_status_entry(index, entry);
    }

    Ok(())
}

fn print_status_entry(index: usize, entry: &JobStatusEntry) {
    let status = describe_status(entry.status);
    let status = match entry.status {
        Some(JobStatus::Finished) => status.green(),
        Some(JobStatus::Running) => status.cyan(),
        Some(JobStatus::Ready) => status.blue(),
        Some(JobStatus::Error) => status.red(),
        None => status.dimmed(),
    };

    println!(
        "  {:>4}  {:<10} {} {}",
        index,
        status,
        entry.job.label,
        format!("({})", entry.job.command).dimmed()
    );
}

async fn show_results(coordinator: &BatchCoordinator, name: &str) -> Result<()> {
    let Some(assembled) = coordinator.get_batch_results(name).await? else {
        println!("{}", format!("Batch {} has not been assembled.", name).yellow());
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&assembled)?);
    Ok(())
}

fn require_batch(found: bool, name: &str) -> Result<()> {
    if !found {
        bail!("Batch {} not found", name);
    }
    Ok(())
}
