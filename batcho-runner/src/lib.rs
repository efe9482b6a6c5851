//! Batcho Runner
//!
//! Coordinates batches of jobs across independent worker processes that
//! share nothing but a key/value store.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Repository: typed store records (batches, statuses, locks, results)
//! - Services: job registry, console capture, batch coordinator
//! - Scheduler: compute-resource polling and run-phase launching
//!
//! A batch is published once, prepared (each job reaches `ready`), run (each
//! job is locked by exactly one worker and ends `finished` or `error`) and
//! finally assembled into a single result object.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use context::JobContext;
pub use error::{BatchError, ErrorKind, Result};
pub use repository::BatchStore;
pub use scheduler::{BatchOutcome, ComputeResourceListener, RunPhase, listen_as_compute_resource};
pub use service::{BatchCoordinator, ConsoleCapture, JobCommand, JobRegistry, register_builtin_commands};
