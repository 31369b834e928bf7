use super::*;
use chrono::TimeZone;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
}

#[test]
fn test_start_is_running() {
    let run = RunRecord::start("scraper", Trigger::Schedule, at(8, 0));
    assert_eq!(run.status, RunStatus::Running);
    assert!(!run.is_finalized());
    assert!(run.duration().is_none());
    assert!(run.log_path.is_none());
}

#[test]
fn test_finish_once() {
    let mut run = RunRecord::start("scraper", Trigger::Schedule, at(8, 0))
        .with_log_path("/logs/scraper_20240115_080000.log");
    run.finish(RunStatus::Succeeded, Some(0), false, at(8, 5))
        .unwrap();

    assert!(run.is_finalized());
    assert!(run.status.is_success());
    assert_eq!(run.exit_code, Some(0));
    assert_eq!(run.duration(), Some(chrono::Duration::minutes(5)));

    let err = run
        .finish(RunStatus::Failed, Some(1), false, at(8, 6))
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyFinalized { .. }));
    assert_eq!(run.status, RunStatus::Succeeded);
}

#[test]
fn test_overlaps() {
    let mut first = RunRecord::start("scraper", Trigger::Schedule, at(8, 0));
    first
        .finish(RunStatus::Succeeded, Some(0), false, at(8, 10))
        .unwrap();

    let second = RunRecord::start("scraper", Trigger::Manual, at(8, 5));
    assert!(first.overlaps(&second));
    assert!(second.overlaps(&first));

    let later = RunRecord::start("scraper", Trigger::Schedule, at(9, 0));
    assert!(!first.overlaps(&later));
    // `later` is still running, so anything after it overlaps
    let even_later = RunRecord::start("scraper", Trigger::Schedule, at(10, 0));
    assert!(later.overlaps(&even_later));
}

#[test]
fn test_status_display_parse() {
    for status in [
        RunStatus::Running,
        RunStatus::Succeeded,
        RunStatus::Failed,
        RunStatus::Crashed,
        RunStatus::TimedOut,
    ] {
        let parsed: RunStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
    assert!("bogus".parse::<RunStatus>().is_err());
    assert!(!RunStatus::Running.is_finished());
    assert!(RunStatus::Crashed.is_finished());
}

#[test]
fn test_trigger_display() {
    assert_eq!(Trigger::Schedule.to_string(), "schedule");
    assert_eq!(Trigger::Manual.to_string(), "manual");
    assert_eq!(
        Trigger::Chained("scraper".to_string()).to_string(),
        "chained:scraper"
    );
}
