//! Scheduler layer for the worker
//!
//! Discovers batches queued on a compute resource and drives each one
//! through prepare, run and assemble.

pub mod listener;
pub mod run_phase;

pub use listener::{BatchOutcome, ComputeResourceListener, listen_as_compute_resource};
pub use run_phase::RunPhase;
