//! Supervisor PID file.
//!
//! Guards against two supervisors sharing one state directory. The liveness
//! probe reads it back: the recorded PID says whether the supervisor is
//! alive, and the file's mtime says when it started.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cronhands_runner::is_process_running;
use tracing::{info, warn};

use crate::error::DaemonError;

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    held: bool,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process wrote the file and has not released it.
    pub fn is_held(&self) -> bool {
        self.held
    }

    fn error(&self, reason: impl std::fmt::Display) -> DaemonError {
        DaemonError::PidFile {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// PID recorded in the file. `None` when there is no file.
    pub fn owner(&self) -> Result<Option<u32>, DaemonError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        let contents = contents.trim();
        contents
            .parse::<u32>()
            .map(Some)
            .map_err(|_| self.error(format!("'{}' is not a PID", contents)))
    }

    /// Whether the recorded process is alive. `None` when there is no file.
    pub fn owner_alive(&self) -> Result<Option<bool>, DaemonError> {
        Ok(self.owner()?.map(is_process_running))
    }

    /// Last write of the file, i.e. when the supervisor started.
    pub fn started_at(&self) -> Result<Option<DateTime<Utc>>, DaemonError> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        let modified = meta.modified().map_err(|e| self.error(e))?;
        Ok(Some(modified.into()))
    }

    /// Claim the file for this process.
    ///
    /// Fails while another live process owns it. A file left by a dead
    /// process, an unreadable file, or one naming our own PID (a restarted
    /// container reuses PID 1) is replaced.
    pub fn try_acquire(&mut self) -> Result<(), DaemonError> {
        let own = std::process::id();
        match self.owner() {
            Ok(Some(pid)) if pid != own && is_process_running(pid) => {
                return Err(DaemonError::AlreadyRunning {
                    path: self.path.clone(),
                    pid,
                });
            }
            Ok(Some(pid)) => warn!("Replacing stale PID file {} (PID {})", self.path.display(), pid),
            Ok(None) => {}
            Err(e) => warn!("Replacing unreadable PID file: {}", e),
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.error(e))?;
        }
        fs::write(&self.path, own.to_string()).map_err(|e| self.error(e))?;
        self.held = true;
        info!("Wrote PID {} to {}", own, self.path.display());
        Ok(())
    }

    /// Remove the file if this process holds it.
    pub fn release(&mut self) -> Result<(), DaemonError> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed PID file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
#[path = "pid_tests.rs"]
mod tests;
