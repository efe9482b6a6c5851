//! Service layer
//!
//! Services hold the coordination logic of a worker: the job registry,
//! console capture, batch-level operations and the built-in commands.

pub mod builtin;
pub mod console;
pub mod coordinator;
pub mod registry;

pub use builtin::register_builtin_commands;
pub use console::{ConsoleCapture, Stream};
pub use coordinator::BatchCoordinator;
pub use registry::{FnCommand, JobCommand, JobRegistry};
