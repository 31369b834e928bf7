//! Retention sweeper.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cronhands_core::RetentionPolicy;
use cronhands_runner::ActiveLogs;
use glob::Pattern;
use tracing::{debug, info, warn};

use crate::error::SweepError;
use crate::policy::is_expired;

/// Result of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Entries matching at least one pattern.
    pub scanned: usize,
    pub deleted: usize,
    /// Expired entries left alone because a run is still writing them.
    pub skipped_active: usize,
    /// Matching entries that are not old enough (or are directories while
    /// `include_dirs` is off).
    pub kept: usize,
    pub deleted_paths: Vec<PathBuf>,
    pub errors: Vec<SweepError>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned={} deleted={} kept={} skipped_active={} errors={}",
            self.scanned,
            self.deleted,
            self.kept,
            self.skipped_active,
            self.errors.len()
        )
    }
}

/// Applies retention policies to a directory.
#[derive(Debug, Clone, Default)]
pub struct RetentionSweeper {
    active: ActiveLogs,
}

impl RetentionSweeper {
    /// Create a sweeper that leaves the given in-flight logs alone.
    pub fn new(active: ActiveLogs) -> Self {
        Self { active }
    }

    /// Delete every entry of `policy.directory` matching one of the patterns
    /// whose mtime is older than `policy.max_age` at `now`.
    ///
    /// Errors on individual entries are collected in the report. Running the
    /// same sweep twice deletes nothing the second time.
    pub fn sweep(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let patterns: Vec<Pattern> = policy
            .patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    report.errors.push(SweepError::Pattern {
                        pattern: p.clone(),
                        reason: e.msg.to_string(),
                    });
                    None
                }
            })
            .collect();

        if patterns.is_empty() {
            debug!("No usable patterns for {}", policy.directory.display());
            return report;
        }

        let entries = match fs::read_dir(&policy.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Sweep directory does not exist: {}", policy.directory.display());
                return report;
            }
            Err(source) => {
                report.errors.push(SweepError::ReadDir {
                    path: policy.directory.clone(),
                    source,
                });
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    report.errors.push(SweepError::ReadDir {
                        path: policy.directory.clone(),
                        source,
                    });
                    continue;
                }
            };

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !patterns.iter().any(|p| p.matches(name)) {
                continue;
            }

            report.scanned += 1;
            self.sweep_entry(&entry.path(), policy, now, &mut report);
        }

        if report.deleted > 0 || !report.errors.is_empty() {
            info!("Sweep of {}: {}", policy.directory.display(), report);
        } else {
            debug!("Sweep of {}: {}", policy.directory.display(), report);
        }
        for error in &report.errors {
            warn!("{}", error);
        }
        report
    }

    fn sweep_entry(
        &self,
        path: &Path,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        // symlinks are judged (and removed) as links, never followed
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(source) => {
                report.errors.push(SweepError::Metadata {
                    path: path.to_path_buf(),
                    source,
                });
                return;
            }
        };

        if metadata.is_dir() && !policy.include_dirs {
            report.kept += 1;
            return;
        }

        let mtime = match metadata.modified() {
            Ok(mtime) => DateTime::<Utc>::from(mtime),
            Err(source) => {
                report.errors.push(SweepError::Metadata {
                    path: path.to_path_buf(),
                    source,
                });
                return;
            }
        };

        if !is_expired(now, mtime, policy.max_age()) {
            report.kept += 1;
            return;
        }

        if self.active.contains(path) {
            debug!("Skipping active log: {}", path.display());
            report.skipped_active += 1;
            return;
        }

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        match removed {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                report.deleted += 1;
                report.deleted_paths.push(path.to_path_buf());
            }
            // already gone: someone else swept it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => report.errors.push(SweepError::Delete {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
