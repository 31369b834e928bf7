//! Scheduler errors.

use thiserror::Error;

/// Why a job table could not be installed. Fatal at startup.
#[derive(Debug, Error)]
pub enum ScheduleInstallError {
    #[error("Invalid job name '{job}': {reason}")]
    InvalidName { job: String, reason: String },

    #[error("Duplicate job name '{0}'")]
    DuplicateName(String),

    #[error("Invalid schedule '{expr}' for job '{job}': {reason}")]
    InvalidCron {
        job: String,
        expr: String,
        reason: String,
    },

    #[error("Schedule '{expr}' for job '{job}' never fires")]
    NoFutureFiring { job: String, expr: String },

    #[error("Job '{job}' chains into unknown job '{target}'")]
    UnknownChainTarget { job: String, target: String },

    #[error("Failed to persist schedule: {0}")]
    Store(#[from] StoreError),
}

/// Schedule store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors returned through the scheduler handle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown job '{0}'")]
    UnknownJob(String),

    #[error("Job '{0}' is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Install(#[from] ScheduleInstallError),

    #[error("Scheduler is not running")]
    Stopped,
}
