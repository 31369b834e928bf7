//! Recent run records, kept in memory per job.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use cronhands_core::RunRecord;
use parking_lot::RwLock;

/// Bounded per-job history of finished runs. Clones share the same records.
#[derive(Debug, Clone)]
pub struct RunHistory {
    capacity: usize,
    runs: Arc<RwLock<HashMap<String, VecDeque<RunRecord>>>>,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a run, dropping the oldest one for its job when full.
    pub fn record(&self, run: RunRecord) {
        let mut runs = self.runs.write();
        let entries = runs.entry(run.job.clone()).or_default();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(run);
    }

    /// Most recent runs of `job`, newest first.
    pub fn recent(&self, job: &str, limit: usize) -> Vec<RunRecord> {
        self.runs
            .read()
            .get(job)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn last(&self, job: &str) -> Option<RunRecord> {
        self.runs.read().get(job).and_then(|e| e.back().cloned())
    }

    /// Total number of retained runs.
    pub fn len(&self) -> usize {
        self.runs.read().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cronhands_core::Trigger;

    fn run(job: &str, hour: u32) -> RunRecord {
        RunRecord::start(job, Trigger::Schedule, Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_recent_newest_first() {
        let history = RunHistory::new(10);
        history.record(run("scraper", 8));
        history.record(run("scraper", 9));
        history.record(run("cleanup", 3));

        let recent = history.recent("scraper", 10);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].started_at > recent[1].started_at);
        assert_eq!(history.last("cleanup").unwrap().job, "cleanup");
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let history = RunHistory::new(2);
        for hour in 1..=3 {
            history.record(run("scraper", hour));
        }

        let recent = history.recent("scraper", 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].started_at, Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_unknown_job() {
        let history = RunHistory::default();
        assert!(history.recent("nope", 5).is_empty());
        assert!(history.last("nope").is_none());
        assert!(history.is_empty());
    }
}
