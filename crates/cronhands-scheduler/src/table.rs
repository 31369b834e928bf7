//! The installed job table.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use cronhands_core::{ScheduledJob, validate_job_name};
use parking_lot::RwLock;
use tracing::info;

use crate::cron_spec::CronSpec;
use crate::error::ScheduleInstallError;
use crate::store::{MemoryScheduleStore, ScheduleStore, StoredSchedule};

/// A job together with its parsed schedule.
#[derive(Debug, Clone)]
pub struct InstalledJob {
    pub job: ScheduledJob,
    pub spec: CronSpec,
}

impl InstalledJob {
    pub fn name(&self) -> &str {
        &self.job.name
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.spec.next_after(after)
    }
}

/// Validated job table. Installing replaces the whole table, so readers see
/// either the old set or the new one.
pub struct ScheduleTable {
    jobs: RwLock<Arc<Vec<InstalledJob>>>,
    store: Arc<dyn ScheduleStore>,
    version: AtomicU64,
}

impl ScheduleTable {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            jobs: RwLock::new(Arc::new(Vec::new())),
            store,
            version: AtomicU64::new(0),
        }
    }

    /// Table backed by an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryScheduleStore::new()))
    }

    /// Validate `jobs`, persist them and make them the active table.
    ///
    /// Nothing changes when any job is rejected.
    pub async fn install(
        &self,
        jobs: Vec<ScheduledJob>,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<InstalledJob>>, ScheduleInstallError> {
        let installed = Self::validate(jobs, now)?;

        let stored = StoredSchedule {
            installed_at: now,
            jobs: installed.iter().map(|i| i.job.clone()).collect(),
        };
        self.store.save(&stored).await?;

        let installed = Arc::new(installed);
        *self.jobs.write() = installed.clone();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Installed schedule v{} with {} jobs",
            version,
            installed.len()
        );
        Ok(installed)
    }

    /// Check a job set without installing it.
    pub fn validate(
        jobs: Vec<ScheduledJob>,
        now: DateTime<Utc>,
    ) -> Result<Vec<InstalledJob>, ScheduleInstallError> {
        let mut seen = HashSet::new();
        let mut installed = Vec::with_capacity(jobs.len());

        for job in jobs {
            validate_job_name(&job.name).map_err(|e| ScheduleInstallError::InvalidName {
                job: job.name.clone(),
                reason: e.to_string(),
            })?;
            if !seen.insert(job.name.clone()) {
                return Err(ScheduleInstallError::DuplicateName(job.name));
            }

            let spec =
                CronSpec::parse(&job.schedule).map_err(|reason| ScheduleInstallError::InvalidCron {
                    job: job.name.clone(),
                    expr: job.schedule.clone(),
                    reason,
                })?;
            if spec.next_after(now).is_none() {
                return Err(ScheduleInstallError::NoFutureFiring {
                    job: job.name.clone(),
                    expr: job.schedule.clone(),
                });
            }

            installed.push(InstalledJob { job, spec });
        }

        for entry in &installed {
            if let Some(target) = &entry.job.on_success {
                if !seen.contains(target) {
                    return Err(ScheduleInstallError::UnknownChainTarget {
                        job: entry.job.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(installed)
    }

    /// The current table.
    pub fn snapshot(&self) -> Arc<Vec<InstalledJob>> {
        self.jobs.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<InstalledJob> {
        self.jobs.read().iter().find(|j| j.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.jobs.read().iter().map(|j| j.job.name.clone()).collect()
    }

    /// Number of successful installs.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
