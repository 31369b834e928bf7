//! In-process run bookkeeping: which jobs are running and which log files
//! are being written.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Log files currently being written. The retention sweeper never deletes a
/// registered path.
#[derive(Debug, Clone, Default)]
pub struct ActiveLogs {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ActiveLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path until the returned guard is dropped.
    pub fn register(&self, path: impl Into<PathBuf>) -> ActiveLogGuard {
        let path = path.into();
        self.paths.lock().insert(path.clone());
        ActiveLogGuard {
            logs: self.clone(),
            path,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}

/// Keeps a log path registered in [`ActiveLogs`].
#[derive(Debug)]
pub struct ActiveLogGuard {
    logs: ActiveLogs,
    path: PathBuf,
}

impl ActiveLogGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ActiveLogGuard {
    fn drop(&mut self) {
        self.logs.paths.lock().remove(&self.path);
    }
}

/// Names of jobs with a run in progress.
#[derive(Debug, Clone, Default)]
pub struct RunningJobs {
    names: Arc<Mutex<HashSet<String>>>,
}

impl RunningJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `job` as running. `None` if it already is.
    pub fn try_claim(&self, job: &str) -> Option<RunGuard> {
        if !self.names.lock().insert(job.to_string()) {
            return None;
        }
        Some(RunGuard {
            jobs: self.clone(),
            job: job.to_string(),
        })
    }

    pub fn is_running(&self, job: &str) -> bool {
        self.names.lock().contains(job)
    }

    pub fn count(&self) -> usize {
        self.names.lock().len()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.lock().iter().cloned().collect();
        names.sort();
        names
    }
}

/// Marks a job as running until dropped.
#[derive(Debug)]
pub struct RunGuard {
    jobs: RunningJobs,
    job: String,
}

impl RunGuard {
    pub fn job(&self) -> &str {
        &self.job
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.jobs.names.lock().remove(&self.job);
    }
}
