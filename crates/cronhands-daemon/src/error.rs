//! Supervisor errors and lifecycle states.

use std::path::PathBuf;

use cronhands_scheduler::ScheduleInstallError;
use thiserror::Error;

/// Why the supervisor could not start or keep running.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The PID file names a live process other than this one.
    #[error("Another supervisor is already running as PID {pid} ({path})")]
    AlreadyRunning { path: PathBuf, pid: u32 },

    #[error("PID file {path}: {reason}")]
    PidFile { path: PathBuf, reason: String },

    #[error("Cannot listen for {signal}: {reason}")]
    SignalSetup { signal: &'static str, reason: String },

    #[error("Supervisor cannot go from {from} to {to}")]
    InvalidStateTransition {
        from: SupervisorState,
        to: SupervisorState,
    },

    /// Validation errors, joined.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The schedule could not be installed. Fatal at startup.
    #[error("Schedule installation failed: {0}")]
    Install(#[from] ScheduleInstallError),
}

/// Lifecycle of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not started yet, or finished.
    Stopped,
    /// Loading the configuration and installing the job table.
    InstallingSchedule,
    /// Schedule installed, scheduler task starting.
    DaemonRunning,
    /// Waiting for a shutdown signal while the scheduler fires jobs.
    SteadyState,
    /// Cancelling the scheduler and waiting for in-flight runs.
    Stopping,
}

impl SupervisorState {
    /// Whether the supervisor may move from `self` to `to`.
    pub fn can_transition_to(self, to: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, to),
            (Stopped, InstallingSchedule)
                | (InstallingSchedule, DaemonRunning)
                | (InstallingSchedule, Stopping)
                | (DaemonRunning, SteadyState)
                | (DaemonRunning, Stopping)
                | (SteadyState, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Stopped => write!(f, "stopped"),
            SupervisorState::InstallingSchedule => write!(f, "installing_schedule"),
            SupervisorState::DaemonRunning => write!(f, "daemon_running"),
            SupervisorState::SteadyState => write!(f, "steady_state"),
            SupervisorState::Stopping => write!(f, "stopping"),
        }
    }
}
