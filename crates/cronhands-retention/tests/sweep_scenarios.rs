//! Retention sweeps over a realistic log directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use cronhands_core::RetentionPolicy;
use cronhands_retention::{is_expired, RetentionSweeper};
use cronhands_runner::ActiveLogs;
use tempfile::TempDir;

const DAY: u64 = 24 * 60 * 60;

fn aged_file(dir: &Path, name: &str, age: Duration) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "output\n").unwrap();
    File::open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
    path
}

#[test]
fn thirty_one_day_file_deleted_ten_day_file_kept() {
    let dir = TempDir::new().unwrap();
    let old = aged_file(dir.path(), "scraper_old.log", Duration::from_secs(31 * DAY));
    let recent = aged_file(dir.path(), "scraper_recent.log", Duration::from_secs(10 * DAY));

    let policy = RetentionPolicy::for_job_logs(dir.path(), ["scraper"], Duration::from_secs(30 * DAY));
    let report = RetentionSweeper::new(ActiveLogs::new()).sweep(&policy, Utc::now());

    assert!(!old.exists());
    assert!(recent.exists());
    assert_eq!(report.deleted, 1);
    assert_eq!(report.kept, 1);
}

#[test]
fn sweep_never_deletes_younger_files() {
    let dir = TempDir::new().unwrap();
    let max_age = Duration::from_secs(7 * DAY);
    let ages = [0u64, 1, 3, 6, 8, 20, 90];
    let paths: Vec<_> = ages
        .iter()
        .map(|d| aged_file(dir.path(), &format!("scraper_{d}.log"), Duration::from_secs(d * DAY)))
        .collect();

    let now = Utc::now();
    let policy = RetentionPolicy::for_job_logs(dir.path(), ["scraper"], max_age);
    RetentionSweeper::default().sweep(&policy, now);

    for path in &paths {
        if let Ok(metadata) = std::fs::metadata(path) {
            let mtime = metadata.modified().unwrap();
            assert!(!is_expired(now, mtime.into(), max_age), "{:?} survived", path);
        }
    }
    let survivors = paths.iter().filter(|p| p.exists()).count();
    assert_eq!(survivors, 4);
}
