//! Persisted schedule table.
//!
//! The daemon writes the installed table here so out-of-process readers
//! (the liveness probe, `cronhands schedule`) see exactly what was installed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cronhands_core::ScheduledJob;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::StoreError;

/// Snapshot of an installed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSchedule {
    pub installed_at: DateTime<Utc>,
    pub jobs: Vec<ScheduledJob>,
}

impl StoredSchedule {
    pub fn job(&self, name: &str) -> Option<&ScheduledJob> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Schedule store trait for persistence.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Replace the stored table.
    async fn save(&self, schedule: &StoredSchedule) -> Result<(), StoreError>;

    /// Load the stored table, if one was saved.
    async fn load(&self) -> Result<Option<StoredSchedule>, StoreError>;
}

/// In-memory schedule store for testing.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    schedule: RwLock<Option<StoredSchedule>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn save(&self, schedule: &StoredSchedule) -> Result<(), StoreError> {
        *self.schedule.write() = Some(schedule.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredSchedule>, StoreError> {
        Ok(self.schedule.read().clone())
    }
}

/// JSON file store. Writes go to a temporary file that is renamed into
/// place, so readers never see a partial table.
#[derive(Debug, Clone)]
pub struct FileScheduleStore {
    path: PathBuf,
}

impl FileScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn save(&self, schedule: &StoredSchedule) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(schedule)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(
            "Saved schedule with {} jobs to {:?}",
            schedule.jobs.len(),
            self.path
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredSchedule>, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}
