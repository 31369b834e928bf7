//! Per-job lock files.
//!
//! `<lock_dir>/<job>.lock` holds the PID of the process running the job, so
//! the daemon and a manual `run-once` never run the same job concurrently.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TaskError;

/// A held job lock. Released when dropped.
#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
    token: String,
    held: bool,
}

impl JobLock {
    /// Path of the lock file for `job` under `lock_dir`.
    pub fn path_for(lock_dir: &Path, job: &str) -> PathBuf {
        lock_dir.join(format!("{}.lock", job))
    }

    /// Acquire the lock for `job`.
    ///
    /// A lock whose owner is gone is reclaimed. So is one naming this
    /// process: a container restarted after an unclean stop gets the same
    /// PID again, and runs within one process are kept apart by
    /// [`RunningJobs`](crate::RunningJobs).
    pub fn acquire(lock_dir: &Path, job: &str) -> Result<Self, TaskError> {
        let path = Self::path_for(lock_dir, job);
        fs::create_dir_all(lock_dir).map_err(|e| TaskError::Lock {
            path: path.clone(),
            reason: format!("Failed to create lock directory: {}", e),
        })?;

        let own = std::process::id();
        let token = Uuid::new_v4().to_string();

        // second attempt runs after a stale lock was removed
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}\n{}", own, token).map_err(|e| TaskError::Lock {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                    debug!("Job lock acquired: {}", path.display());
                    return Ok(Self {
                        path,
                        token,
                        held: true,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    match Self::read_owner(&path) {
                        Some(pid) if pid != own && is_process_running(pid) => {
                            return Err(TaskError::AlreadyRunning {
                                job: job.to_string(),
                                pid,
                            });
                        }
                        owner => {
                            warn!(
                                "Removing stale job lock (owner {:?}): {}",
                                owner,
                                path.display()
                            );
                            if let Err(e) = fs::remove_file(&path) {
                                if e.kind() != std::io::ErrorKind::NotFound {
                                    return Err(TaskError::Lock {
                                        path,
                                        reason: e.to_string(),
                                    });
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    return Err(TaskError::Lock {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(TaskError::Lock {
            path,
            reason: "lock was re-created while reclaiming it".to_string(),
        })
    }

    /// PID recorded in a lock file, if readable.
    pub fn read_owner(path: &Path) -> Option<u32> {
        fs::read_to_string(path).ok()?.lines().next()?.trim().parse().ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock early. A lock file that was reclaimed by a later
    /// acquire is left to its new holder.
    pub fn release(&mut self) -> Result<(), TaskError> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        let still_ours = fs::read_to_string(&self.path)
            .map(|contents| contents.lines().nth(1) == Some(self.token.as_str()))
            .unwrap_or(false);
        if !still_ours {
            debug!("Job lock no longer ours: {}", self.path.display());
            return Ok(());
        }

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TaskError::Lock {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release job lock on drop: {}", e);
        }
    }
}

/// Check if a process with the given PID is running.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // signal 0 only checks for existence; EPERM means it exists under another user
    matches!(kill(Pid::from_raw(raw), None::<Signal>), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    true
}
