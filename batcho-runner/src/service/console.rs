//! Console capture service
//!
//! Collects everything a job prints while it runs into a temporary file, and
//! echoes it to the worker's own stdout/stderr so operators still see output
//! live. One capture is active at a time per `ConsoleCapture`; a coordinator
//! owns exactly one and runs one job at a time.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};

/// Which console stream a write belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Tee of job output into a capture file
#[derive(Debug, Default)]
pub struct ConsoleCapture {
    active: Mutex<Option<NamedTempFile>>,
    dir: Option<PathBuf>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates capture files in `dir` instead of the system temp directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            active: Mutex::default(),
            dir: Some(dir.into()),
        }
    }

    /// Starts capturing into a fresh temporary file and returns its path
    ///
    /// A capture that is already active is stopped (and its file discarded)
    /// first.
    pub fn start_writing_to_file(&self) -> io::Result<PathBuf> {
        let mut active = self.active();

        if active.take().is_some() {
            debug!("Discarding console capture that was still active");
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("batcho-console-").suffix(".txt");
        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let path = file.path().to_path_buf();
        *active = Some(file);

        Ok(path)
    }

    /// Stops capturing
    ///
    /// Returns the capture file, which is deleted when the returned handle is
    /// dropped. Returns `None` when no capture was active.
    pub fn stop_writing_to_file(&self) -> Option<TempPath> {
        let mut file = self.active().take()?;

        if let Err(e) = file.flush() {
            warn!("Failed to flush console capture: {}", e);
        }

        Some(file.into_temp_path())
    }

    /// Whether a capture is in progress
    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    /// Writes text to the given stream and, if active, to the capture file
    pub fn write(&self, stream: Stream, text: &str) {
        let echoed = match stream {
            Stream::Stdout => io::stdout().lock().write_all(text.as_bytes()),
            Stream::Stderr => io::stderr().lock().write_all(text.as_bytes()),
        };
        if let Err(e) = echoed {
            debug!("Failed to echo job output: {}", e);
        }

        if let Some(file) = self.active().as_mut() {
            if let Err(e) = file.write_all(text.as_bytes()) {
                warn!("Failed to write to console capture: {}", e);
            }
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<NamedTempFile>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_both_streams() {
        let console = ConsoleCapture::new();
        let path = console.start_writing_to_file().unwrap();
        assert!(console.is_active());

        console.write(Stream::Stdout, "out line\n");
        console.write(Stream::Stderr, "err line\n");

        let file = console.stop_writing_to_file().unwrap();
        assert_eq!(file.to_path_buf(), path);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "out line\nerr line\n"
        );
        assert!(!console.is_active());
    }

    #[test]
    fn test_output_outside_capture_is_not_recorded() {
        let console = ConsoleCapture::new();
        console.write(Stream::Stdout, "before\n");

        console.start_writing_to_file().unwrap();
        console.write(Stream::Stdout, "during\n");
        let file = console.stop_writing_to_file().unwrap();
        console.write(Stream::Stdout, "after\n");

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "during\n");
    }

    #[test]
    fn test_restart_discards_previous_capture() {
        let console = ConsoleCapture::new();
        let first = console.start_writing_to_file().unwrap();
        console.write(Stream::Stdout, "stale\n");

        let second = console.start_writing_to_file().unwrap();
        assert_ne!(first, second);
        assert!(!first.exists());

        let file = console.stop_writing_to_file().unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "");
    }

    #[test]
    fn test_capture_in_missing_dir_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let console = ConsoleCapture::in_dir(dir.path().join("gone"));

        assert!(console.start_writing_to_file().is_err());
        assert!(!console.is_active());
    }

    #[test]
    fn test_stop_without_capture_is_noop() {
        let console = ConsoleCapture::new();
        assert!(console.stop_writing_to_file().is_none());
    }

    #[test]
    fn test_dropping_file_handle_deletes_it() {
        let console = ConsoleCapture::new();
        let path = console.start_writing_to_file().unwrap();
        drop(console.stop_writing_to_file());
        assert!(!path.exists());
    }
}
