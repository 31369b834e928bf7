//! Task runner errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// The child could not be spawned.
    #[error("Failed to spawn job '{job}': {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    /// The run log could not be created or written.
    #[error("Run log error at {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The child exited with a non-zero code.
    #[error("Process exited with code {exit_code}")]
    Execution { exit_code: i32 },

    /// The child was killed by a signal.
    #[error("Process terminated by signal {signal}")]
    Crash { signal: i32 },

    #[error("Process timed out after {0:?}")]
    TimedOut(Duration),

    /// Another run of the job holds the lock.
    #[error("Job '{job}' is already running (PID {pid})")]
    AlreadyRunning { job: String, pid: u32 },

    #[error("Lock file error at {path}: {reason}")]
    Lock { path: PathBuf, reason: String },

    #[error("Job '{0}' has no command")]
    NotACommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
