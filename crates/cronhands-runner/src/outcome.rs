//! Process outcome.

use std::process::ExitStatus;

use cronhands_core::RunStatus;

use crate::error::TaskError;

/// Exit information taken from the child's own wait status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            exit_code: None,
            signal: Some(signal),
        }
    }

    /// Exit code as a shell reports it: the code itself, or 128 + signal.
    pub fn recorded_exit_code(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status(&self) -> RunStatus {
        match (self.exit_code, self.signal) {
            (Some(0), _) => RunStatus::Succeeded,
            (Some(_), _) => RunStatus::Failed,
            (None, _) => RunStatus::Crashed,
        }
    }

    /// The error this outcome represents, if any.
    pub fn error(&self) -> Option<TaskError> {
        match (self.exit_code, self.signal) {
            (Some(0), _) => None,
            (Some(exit_code), _) => Some(TaskError::Execution { exit_code }),
            (None, Some(signal)) => Some(TaskError::Crash { signal }),
            (None, None) => Some(TaskError::Execution { exit_code: -1 }),
        }
    }
}

impl From<ExitStatus> for ProcessOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::signaled(signal);
            }
        }
        Self {
            exit_code: status.code(),
            signal: None,
        }
    }
}
